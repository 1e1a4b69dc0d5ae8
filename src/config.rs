//! Relay configuration (JSON5).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::register::{RegisterGroup, RegisterKind, ScanPlan};
use crate::serialization::Format;

/// Complete relay configuration.
///
/// The connection and scan keys mirror the device-facing property names:
/// `backend`, `address`, `tcp_port`, `rate`, `time_interval`, and the
/// per-group `{kind}_addr` / `{kind}_no` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Transport backend (default: tcp).
    #[serde(default)]
    pub backend: Backend,

    /// Slave host for tcp/tcppi, serial device path for rtu.
    pub address: String,

    /// TCP port, or service name for tcppi (default: "502").
    #[serde(default = "default_tcp_port")]
    pub tcp_port: String,

    /// Serial baud rate; required for rtu.
    #[serde(default)]
    pub rate: Option<u32>,

    /// Modbus unit/slave id (1-247).
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Scan interval in seconds.
    #[serde(default = "default_time_interval")]
    pub time_interval: u64,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Register groups to poll.
    #[serde(flatten)]
    pub scan: ScanConfig,

    /// Serialization format for emitted records.
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_tcp_port() -> String {
    "502".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_time_interval() -> u64 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Transport backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Modbus TCP with a numeric port.
    #[default]
    Tcp,
    /// Protocol-independent TCP: hostname or IPv6 address plus a service
    /// name or port string.
    Tcppi,
    /// Modbus RTU over a serial line, fixed 8N1 framing.
    Rtu,
}

/// Per-group scan spans. A zero point count disables the group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub coil_addr: u16,
    #[serde(default)]
    pub coil_no: u16,

    #[serde(default)]
    pub discrete_input_addr: u16,
    #[serde(default)]
    pub discrete_input_no: u16,

    #[serde(default)]
    pub holding_reg_addr: u16,
    #[serde(default)]
    pub holding_reg_no: u16,

    #[serde(default)]
    pub input_reg_addr: u16,
    #[serde(default)]
    pub input_reg_no: u16,
}

impl ScanConfig {
    /// Build the scan plan; disabled groups are dropped.
    pub fn plan(&self) -> Result<ScanPlan> {
        ScanPlan::new([
            RegisterGroup {
                kind: RegisterKind::Coil,
                base_address: self.coil_addr,
                point_count: self.coil_no,
            },
            RegisterGroup {
                kind: RegisterKind::DiscreteInput,
                base_address: self.discrete_input_addr,
                point_count: self.discrete_input_no,
            },
            RegisterGroup {
                kind: RegisterKind::HoldingRegister,
                base_address: self.holding_reg_addr,
                point_count: self.holding_reg_no,
            },
            RegisterGroup {
                kind: RegisterKind::InputRegister,
                base_address: self.input_reg_addr,
                point_count: self.input_reg_no,
            },
        ])
    }
}

/// Resolved connection target, one variant per backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    /// Modbus TCP.
    Tcp { host: String, port: u16 },
    /// Protocol-independent TCP; the service is resolved at connect time.
    Tcppi { host: String, service: String },
    /// Modbus RTU over a serial line.
    Rtu { device: String, rate: u32 },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: RelayConfig = json5::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: RelayConfig = json5::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::Config("address cannot be empty".to_string()));
        }

        if self.unit_id == 0 {
            return Err(Error::Config("unit_id must be 1-247".to_string()));
        }

        if self.backend == Backend::Rtu {
            match self.rate {
                None => {
                    return Err(Error::Config(
                        "rate is required for the rtu backend".to_string(),
                    ));
                }
                Some(0) => {
                    return Err(Error::Config("rate must be non-zero".to_string()));
                }
                Some(_) => {}
            }
        }

        // Resolve early so a bad tcp_port fails at startup, not on the
        // first tick.
        self.connection()?;

        Ok(())
    }

    /// Resolve the typed connection target for the configured backend.
    pub fn connection(&self) -> Result<ConnectionConfig> {
        match self.backend {
            Backend::Tcp => {
                let port: u16 = self.tcp_port.parse().map_err(|_| {
                    Error::Config(format!("invalid tcp_port '{}'", self.tcp_port))
                })?;
                Ok(ConnectionConfig::Tcp {
                    host: self.address.clone(),
                    port,
                })
            }
            Backend::Tcppi => Ok(ConnectionConfig::Tcppi {
                host: self.address.clone(),
                service: self.tcp_port.clone(),
            }),
            Backend::Rtu => {
                let rate = self
                    .rate
                    .ok_or_else(|| Error::Config("rate is required for the rtu backend".to_string()))?;
                Ok(ConnectionConfig::Rtu {
                    device: self.address.clone(),
                    rate,
                })
            }
        }
    }
}
