//! Per-tick record model and its wire shape.
//!
//! One record per tick: a two-element sequence of the tick timestamp and a
//! map with one entry per collected register group, in scan order. A group
//! that failed to read carries a one-entry error map instead of its values.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::register::RegisterKind;

/// Tick instant with microsecond precision, serialized as `[sec, usec]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Microseconds within the second.
    pub usec: u32,
}

impl Timestamp {
    /// Capture the current instant.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            sec: now.timestamp(),
            usec: now.timestamp_subsec_micros(),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.sec)?;
        tuple.serialize_element(&self.usec)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [seconds, microseconds] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let sec = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let usec = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Timestamp { sec, usec })
            }
        }

        deserializer.deserialize_tuple(2, TimestampVisitor)
    }
}

/// One field of a record: raw readings, or the error that replaced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Raw point values in device-returned order; 0/1 for bit kinds, full
    /// 16-bit words otherwise.
    Values(Vec<u16>),
    /// Per-group read failure, kept in the record instead of failing the
    /// whole tick.
    Error { error: String },
}

impl FieldValue {
    /// Build an error field from a message.
    pub fn error(message: impl Into<String>) -> Self {
        FieldValue::Error {
            error: message.into(),
        }
    }
}

/// One collected record: `[timestamp, {group: values | {"error": msg}}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: Timestamp,
    fields: Vec<(RegisterKind, FieldValue)>,
}

impl Record {
    /// Start a record for the given tick instant.
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            fields: Vec::new(),
        }
    }

    /// Append a field. Scan order makes kinds unique; repeating one is a
    /// caller bug.
    pub fn push(&mut self, kind: RegisterKind, value: FieldValue) {
        debug_assert!(self.fields.iter().all(|(k, _)| *k != kind));
        self.fields.push((kind, value));
    }

    /// Collected fields in insertion (scan) order.
    pub fn fields(&self) -> impl Iterator<Item = (RegisterKind, &FieldValue)> {
        self.fields.iter().map(|(kind, value)| (*kind, value))
    }

    /// Look up the field for one register kind.
    pub fn get(&self, kind: RegisterKind) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, value)| value)
    }

    /// Number of collected fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no group was collected this tick.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct FieldMap<'a>(&'a [(RegisterKind, FieldValue)]);

        impl Serialize for FieldMap<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (kind, value) in self.0 {
                    map.serialize_entry(kind.wire_name(), value)?;
                }
                map.end()
            }
        }

        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.timestamp)?;
        tuple.serialize_element(&FieldMap(&self.fields))?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMap(Vec<(RegisterKind, FieldValue)>);

        impl<'de> Deserialize<'de> for FieldMap {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct FieldMapVisitor;

                impl<'de> Visitor<'de> for FieldMapVisitor {
                    type Value = FieldMap;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("a map of register group fields")
                    }

                    fn visit_map<A: MapAccess<'de>>(
                        self,
                        mut map: A,
                    ) -> Result<Self::Value, A::Error> {
                        let mut fields: Vec<(RegisterKind, FieldValue)> = Vec::new();
                        while let Some(key) = map.next_key::<String>()? {
                            let kind = RegisterKind::from_wire_name(&key).ok_or_else(|| {
                                de::Error::custom(format!("unknown field key '{}'", key))
                            })?;
                            if fields.iter().any(|(k, _)| *k == kind) {
                                return Err(de::Error::custom(format!(
                                    "duplicate field key '{}'",
                                    key
                                )));
                            }
                            fields.push((kind, map.next_value()?));
                        }
                        Ok(FieldMap(fields))
                    }
                }

                deserializer.deserialize_map(FieldMapVisitor)
            }
        }

        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [timestamp, field map] record")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let timestamp = seq
                    .next_element::<Timestamp>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let FieldMap(fields) = seq
                    .next_element::<FieldMap>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Record { timestamp, fields })
            }
        }

        deserializer.deserialize_tuple(2, RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{Format, decode, encode};

    fn ts() -> Timestamp {
        Timestamp {
            sec: 1000,
            usec: 500,
        }
    }

    #[test]
    fn test_encode_holding_registers() {
        let mut record = Record::new(ts());
        record.push(
            RegisterKind::HoldingRegister,
            FieldValue::Values(vec![10, 20, 30]),
        );

        let encoded = encode(&record, Format::Json).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"[[1000,500],{"holding_registers":[10,20,30]}]"#
        );
    }

    #[test]
    fn test_encode_error_field() {
        let mut record = Record::new(ts());
        record.push(
            RegisterKind::Coil,
            FieldValue::error("Illegal data address"),
        );

        let encoded = encode(&record, Format::Json).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"[[1000,500],{"coils":{"error":"Illegal data address"}}]"#
        );
    }

    #[test]
    fn test_encode_empty_record_keeps_timestamp() {
        let record = Record::new(ts());

        let encoded = encode(&record, Format::Json).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), "[[1000,500],{}]");
    }

    #[test]
    fn test_fields_follow_insertion_order() {
        let mut record = Record::new(ts());
        record.push(RegisterKind::Coil, FieldValue::Values(vec![1, 0]));
        record.push(
            RegisterKind::InputRegister,
            FieldValue::Values(vec![7]),
        );

        let encoded = encode(&record, Format::Json).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"[[1000,500],{"coils":[1,0],"input_registers":[7]}]"#
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let mut record = Record::new(ts());
        record.push(RegisterKind::Coil, FieldValue::Values(vec![0, 1, 1]));
        record.push(RegisterKind::HoldingRegister, FieldValue::error("boom"));

        let encoded = encode(&record, Format::Json).unwrap();
        let decoded: Record = decode(&encoded, Format::Json).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(
            decoded.get(RegisterKind::HoldingRegister),
            Some(&FieldValue::error("boom"))
        );
    }

    #[test]
    fn test_cbor_roundtrip() {
        let mut record = Record::new(ts());
        record.push(
            RegisterKind::DiscreteInput,
            FieldValue::Values(vec![1, 0, 0, 1]),
        );

        let encoded = encode(&record, Format::Cbor).unwrap();
        let decoded: Record = decode(&encoded, Format::Cbor).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_unknown_field_key() {
        let data = br#"[[1000,500],{"registers":[1]}]"#;
        assert!(decode::<Record>(data, Format::Json).is_err());
    }

    #[test]
    fn test_timestamp_now_is_recent() {
        let before = chrono::Utc::now().timestamp();
        let stamp = Timestamp::now();
        let after = chrono::Utc::now().timestamp();

        assert!(stamp.sec >= before && stamp.sec <= after);
        assert!(stamp.usec < 1_000_000);
    }
}
