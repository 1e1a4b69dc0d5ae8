//! Integration tests for the modbus-relay library.

use modbus_relay::{
    Backend, ConnectionConfig, FieldValue, Format, Record, RegisterKind, RelayConfig, Timestamp,
    WriteTarget, decode, decode_auto, decode_batch, detect_format, encode,
};

#[test]
fn test_full_collect_workflow() {
    // Parse a polling configuration
    let config = RelayConfig::parse(
        r#"{
            address: "192.168.1.10",
            tcp_port: "1502",
            unit_id: 3,
            time_interval: 5,
            coil_addr: 0,
            coil_no: 4,
            holding_reg_addr: 100,
            holding_reg_no: 2,
            serialization: "cbor",
        }"#,
    )
    .expect("Config parse failed");

    assert_eq!(config.backend, Backend::Tcp);
    assert_eq!(
        config.connection().unwrap(),
        ConnectionConfig::Tcp {
            host: "192.168.1.10".to_string(),
            port: 1502,
        }
    );

    // The scan plan keeps the fixed group order regardless of config order
    let plan = config.scan.plan().expect("Scan plan failed");
    let groups: Vec<_> = plan.groups().collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].kind, RegisterKind::Coil);
    assert_eq!(groups[0].point_count, 4);
    assert_eq!(groups[1].kind, RegisterKind::HoldingRegister);
    assert_eq!(groups[1].base_address, 100);

    // Assemble the record a tick over this plan would produce
    let mut record = Record::new(Timestamp {
        sec: 1724400000,
        usec: 125000,
    });
    record.push(RegisterKind::Coil, FieldValue::Values(vec![1, 0, 1, 1]));
    record.push(
        RegisterKind::HoldingRegister,
        FieldValue::Values(vec![520, 498]),
    );

    // Encode with the configured format and decode it back
    let encoded = encode(&record, config.serialization).expect("CBOR encode failed");
    let decoded: Record = decode(&encoded, Format::Cbor).expect("CBOR decode failed");
    assert_eq!(decoded, record);

    // Auto-detection recognizes both wire formats
    assert_eq!(detect_format(&encoded), Format::Cbor);
    let json = encode(&record, Format::Json).expect("JSON encode failed");
    assert_eq!(detect_format(&json), Format::Json);
    let auto: Record = decode_auto(&json).expect("Auto decode failed");
    assert_eq!(auto, record);
}

#[test]
fn test_record_wire_shape() {
    let mut record = Record::new(Timestamp {
        sec: 1724400000,
        usec: 0,
    });
    record.push(RegisterKind::DiscreteInput, FieldValue::Values(vec![0, 1]));
    record.push(RegisterKind::InputRegister, FieldValue::error("Timed out"));

    let encoded = encode(&record, Format::Json).unwrap();
    assert_eq!(
        String::from_utf8(encoded).unwrap(),
        r#"[[1724400000,0],{"discrete_inputs":[0,1],"input_registers":{"error":"Timed out"}}]"#
    );
}

#[test]
fn test_collected_records_produce_no_write_commands() {
    // A relay reading its own output must not issue writes: raw value arrays
    // carry no address/value pairs.
    let mut record = Record::new(Timestamp {
        sec: 1724400000,
        usec: 0,
    });
    record.push(RegisterKind::Coil, FieldValue::Values(vec![1, 0]));
    record.push(
        RegisterKind::HoldingRegister,
        FieldValue::Values(vec![10, 20]),
    );

    let encoded = encode(&record, Format::Json).unwrap();
    assert!(decode_batch(&encoded, Format::Json).is_empty());

    let encoded = encode(&record, Format::Cbor).unwrap();
    assert!(decode_batch(&encoded, Format::Cbor).is_empty());
}

#[test]
fn test_write_batch_decoding() {
    let batch = br#"
        [[1724400000, 0], {"coils": [{"address": 5, "value": true}]}]
        [[1724400001, 0], {"holding_registers": [
            {"address": 100, "value": 742},
            {"address": 101}
        ]}]
    "#;

    let commands = decode_batch(batch, Format::Json);

    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].target, WriteTarget::Coil);
    assert_eq!(commands[0].address, 5);
    assert_eq!(commands[0].value, 1);
    assert_eq!(commands[1].target, WriteTarget::HoldingRegister);
    assert_eq!(commands[1].address, 100);
    assert_eq!(commands[1].value, 742);
}

#[test]
fn test_rtu_config_workflow() {
    let config = RelayConfig::parse(
        r#"{
            backend: "rtu",
            address: "/dev/ttyUSB0",
            rate: 9600,
            input_reg_addr: 0,
            input_reg_no: 6,
        }"#,
    )
    .expect("Config parse failed");

    assert_eq!(
        config.connection().unwrap(),
        ConnectionConfig::Rtu {
            device: "/dev/ttyUSB0".to_string(),
            rate: 9600,
        }
    );

    let plan = config.scan.plan().unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(
        plan.groups().next().unwrap().kind,
        RegisterKind::InputRegister
    );
}
