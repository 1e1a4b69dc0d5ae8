use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Serialization format for relay records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary, better for high-rate polling).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Try to auto-detect the format from the data.
///
/// Returns `Json` if the data starts with `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.first() {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let format = detect_format(data);
    decode(data, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, Record, Timestamp};
    use crate::register::RegisterKind;

    fn sample_record() -> Record {
        let mut record = Record::new(Timestamp { sec: 1700000000, usec: 250 });
        record.push(
            RegisterKind::HoldingRegister,
            FieldValue::Values(vec![10, 20, 30]),
        );
        record
    }

    #[test]
    fn test_json_roundtrip() {
        let record = sample_record();

        let encoded = encode(&record, Format::Json).unwrap();
        let decoded: Record = decode(&encoded, Format::Json).unwrap();

        assert_eq!(record, decoded);
    }

    #[test]
    fn test_cbor_roundtrip() {
        let record = sample_record();

        let encoded = encode(&record, Format::Cbor).unwrap();
        let decoded: Record = decode(&encoded, Format::Cbor).unwrap();

        assert_eq!(record, decoded);
    }

    #[test]
    fn test_cbor_is_smaller() {
        let record = sample_record();

        let json = encode(&record, Format::Json).unwrap();
        let cbor = encode(&record, Format::Cbor).unwrap();

        assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(b"[[1, 0], {}]"), Format::Json);
        assert_eq!(detect_format(b"{\"key\": \"value\"}"), Format::Json);
        assert_eq!(detect_format(b"\x82\x82\x01\x00\xa0"), Format::Cbor);
    }

    #[test]
    fn test_auto_decode() {
        let record = sample_record();

        let json = encode(&record, Format::Json).unwrap();
        let decoded: Record = decode_auto(&json).unwrap();
        assert_eq!(decoded, record);

        let cbor = encode(&record, Format::Cbor).unwrap();
        let decoded: Record = decode_auto(&cbor).unwrap();
        assert_eq!(decoded, record);
    }
}
