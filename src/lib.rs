//! Modbus Relay Library
//!
//! This crate polls register groups from a Modbus slave and relays them as
//! timestamped records, and applies inbound write batches back to the slave:
//!
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`register`] - Register kinds, scan groups, and the scan plan
//! - [`record`] - Per-tick record model and its wire shape
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`connection`] - Transport abstraction and the reconnect state machine
//! - [`collector`] - Poll-and-encode pipeline
//! - [`writer`] - Write batch decoding and application
//! - [`error`] - Error types
//!
//! One record is emitted per tick, shaped as a `[timestamp, fieldMap]` pair:
//!
//! ```json
//! [[1724400000, 125000], {"coils": [1, 0, 1], "holding_registers": [10, 20]}]
//! ```

pub mod collector;
pub mod config;
pub mod connection;
pub mod error;
pub mod record;
pub mod register;
pub mod serialization;
pub mod writer;

// Re-export commonly used types at the crate root
pub use collector::PollCollector;
pub use config::{Backend, ConnectionConfig, LogFormat, LoggingConfig, RelayConfig, ScanConfig};
pub use connection::{ConnectionManager, ErrorClass, ModbusTransport, Transport, TransportError};
pub use error::{Error, Result};
pub use record::{FieldValue, Record, Timestamp};
pub use register::{RegisterGroup, RegisterKind, ScanPlan, WriteTarget};
pub use serialization::{Format, decode, decode_auto, detect_format, encode};
pub use writer::{ApplyOutcome, WriteApplier, WriteCommand, decode_batch};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
