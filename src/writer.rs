//! Decode-and-apply pipeline for inbound write batches.
//!
//! A batch is a buffer of concatenated records in the read shape, where each
//! field value is an array of `{"address": <uint>, "value": <uint16|bool>}`
//! objects. Decoding is permissive: unknown or read-only field keys and
//! malformed entries are skipped without aborting the batch.

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::connection::{ConnectionManager, Transport};
use crate::register::{RegisterKind, WriteTarget};
use crate::serialization::Format;

/// A single decoded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCommand {
    pub target: WriteTarget,
    pub address: u16,
    pub value: u16,
}

/// Outcome of applying one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The batch was processed; individual failures are logged, not retried.
    Applied { written: usize, failed: usize },
    /// Nothing was applied; the caller should re-deliver the batch later.
    Retry,
}

/// Decode a whole batch buffer into write commands.
///
/// The buffer holds independent top-level records; a malformed record is
/// skipped and decoding continues with the next one. A byte-level syntax
/// error ends the scan of the remaining buffer, since the stream has no
/// resynchronization point.
pub fn decode_batch(data: &[u8], format: Format) -> Vec<WriteCommand> {
    let mut commands = Vec::new();

    match format {
        Format::Json => {
            let stream = serde_json::Deserializer::from_slice(data).into_iter::<Value>();
            for record in stream {
                match record {
                    Ok(value) => commands_from_record(&value, &mut commands),
                    Err(e) => {
                        warn!("stopping batch decode on malformed input: {}", e);
                        break;
                    }
                }
            }
        }
        Format::Cbor => {
            let mut cursor = data;
            while !cursor.is_empty() {
                match ciborium::from_reader::<ciborium::Value, _>(&mut cursor) {
                    Ok(value) => match serde_json::to_value(&value) {
                        Ok(value) => commands_from_record(&value, &mut commands),
                        Err(e) => debug!("skipping record with unmappable structure: {}", e),
                    },
                    Err(e) => {
                        warn!("stopping batch decode on malformed input: {}", e);
                        break;
                    }
                }
            }
        }
    }

    commands
}

/// Walk one `[timestamp, fieldMap]` record for write entries.
fn commands_from_record(root: &Value, out: &mut Vec<WriteCommand>) {
    let Some(fields) = root.get(1).and_then(Value::as_object) else {
        debug!("skipping record without a field map");
        return;
    };

    for (key, entries) in fields {
        let Some(kind) = RegisterKind::from_wire_name(key) else {
            continue;
        };
        // Read-only groups carry no write semantics.
        let Some(target) = kind.write_target() else {
            continue;
        };
        let Some(entries) = entries.as_array() else {
            continue;
        };

        for entry in entries {
            match write_command(target, entry) {
                Some(command) => out.push(command),
                None => debug!("skipping malformed {} write entry: {}", kind, entry),
            }
        }
    }
}

/// Resolve one `{address, value}` object. Both keys must resolve within the
/// entry or it is dropped whole; no partial command is emitted.
fn write_command(target: WriteTarget, entry: &Value) -> Option<WriteCommand> {
    let object = entry.as_object()?;
    let mut address = None;
    let mut value = None;

    for (key, item) in object {
        match key.as_str() {
            "address" => address = item.as_u64().and_then(|a| u16::try_from(a).ok()),
            "value" => {
                value = match item {
                    Value::Bool(on) => Some(u16::from(*on)),
                    // Negative and oversized integers truncate to the low
                    // 16 bits.
                    other => other.as_i64().map(|v| v as u16),
                }
            }
            _ => {}
        }
    }

    Some(WriteCommand {
        target,
        address: address?,
        value: value?,
    })
}

/// Applies decoded write commands through the connection manager.
pub struct WriteApplier<T> {
    conn: ConnectionManager<T>,
}

impl<T: Transport> WriteApplier<T> {
    pub fn new(conn: ConnectionManager<T>) -> Self {
        Self { conn }
    }

    /// The connection state shared by this applier.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.conn
    }

    /// Apply one batch.
    ///
    /// A reconnect failure retries the whole batch without applying anything;
    /// a failed individual write is logged with its address and value and the
    /// batch continues.
    pub async fn apply_batch(&mut self, commands: &[WriteCommand]) -> ApplyOutcome {
        if let Err(e) = self.conn.ensure_connected().await {
            warn!("connect failed, batch will be retried: {}", e);
            return ApplyOutcome::Retry;
        }

        let mut written = 0;
        let mut failed = 0;

        for command in commands {
            match self
                .conn
                .write(command.target, command.address, command.value)
                .await
            {
                Ok(()) => written += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        "writing {} at address {} (value {}) failed: {}",
                        command.target, command.address, command.value, e
                    );
                }
            }
        }

        ApplyOutcome::Applied { written, failed }
    }

    /// Close the connection; used at shutdown.
    pub async fn close(&mut self) {
        self.conn.close().await;
    }
}
