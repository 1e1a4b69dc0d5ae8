//! Transport seam and the reconnect state machine.
//!
//! Modbus framing, CRC and function codes live in the client library; this
//! module only moves whole operations across the wire and decides, after
//! each one, whether the connection handle is still usable.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::register::{RegisterKind, WriteTarget};

/// Failure of a single transport operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transport-level I/O failure.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Modbus exception returned by the device.
    #[error("modbus exception: {0:?}")]
    Exception(tokio_modbus::ExceptionCode),
}

impl From<tokio_modbus::Error> for TransportError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(e) => TransportError::Io(e),
            tokio_modbus::Error::Protocol(e) => TransportError::Io(io::Error::other(e)),
        }
    }
}

impl TransportError {
    /// Error class used for the reconnect decision.
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::Io(e) if is_connection_error(e) => ErrorClass::Connection,
            _ => ErrorClass::Protocol,
        }
    }
}

/// Transport faults that invalidate the connection handle.
fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Classification of the most recent transport operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorClass {
    /// Last operation succeeded.
    #[default]
    None,
    /// The handle is unusable; the next call must reconnect.
    Connection,
    /// The device rejected the request; the connection stays up.
    Protocol,
}

/// Blocking-per-call Modbus operations used by both relay directions.
pub trait Transport {
    async fn connect(&mut self) -> io::Result<()>;
    async fn close(&mut self) -> io::Result<()>;
    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError>;
    async fn read_discrete_inputs(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError>;
    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;
    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;
    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError>;
    async fn write_register(&mut self, addr: u16, value: u16) -> Result<(), TransportError>;
}

/// Production transport over tokio-modbus (tcp, tcppi and rtu backends).
pub struct ModbusTransport {
    target: ConnectionConfig,
    unit_id: u8,
    connect_timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusTransport {
    pub fn new(target: ConnectionConfig, unit_id: u8, connect_timeout: Duration) -> Self {
        Self {
            target,
            unit_id,
            connect_timeout,
            ctx: None,
        }
    }

    fn context(&mut self) -> Result<&mut Context, TransportError> {
        self.ctx.as_mut().ok_or_else(|| {
            TransportError::Io(io::Error::new(io::ErrorKind::NotConnected, "not connected"))
        })
    }

    async fn open(&mut self) -> io::Result<Context> {
        let slave = Slave(self.unit_id);

        match &self.target {
            ConnectionConfig::Tcp { host, port } => {
                let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("invalid address: {}", e))
                })?;

                tokio::time::timeout(self.connect_timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
            }
            ConnectionConfig::Tcppi { host, service } => {
                let mut addrs = tokio::net::lookup_host(format!("{}:{}", host, service)).await?;
                let addr = addrs.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
                })?;

                tokio::time::timeout(self.connect_timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
            }
            ConnectionConfig::Rtu { device, rate } => {
                // 8N1 framing, matching the device-facing defaults.
                let builder = tokio_serial::new(device, *rate)
                    .parity(tokio_serial::Parity::None)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .stop_bits(tokio_serial::StopBits::One);

                let serial = tokio_serial::SerialStream::open(&builder).map_err(io::Error::other)?;
                Ok(rtu::attach_slave(serial, slave))
            }
        }
    }
}

/// Unwrap the nested transport/exception result of a tokio-modbus call.
fn flatten<T>(result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(TransportError::Exception(exception)),
        Err(err) => Err(err.into()),
    }
}

impl Transport for ModbusTransport {
    async fn connect(&mut self) -> io::Result<()> {
        self.ctx = Some(self.open().await?);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the context closes the underlying stream.
        self.ctx = None;
        Ok(())
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        flatten(self.context()?.read_coils(addr, count).await)
    }

    async fn read_discrete_inputs(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError> {
        flatten(self.context()?.read_discrete_inputs(addr, count).await)
    }

    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        flatten(self.context()?.read_holding_registers(addr, count).await)
    }

    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        flatten(self.context()?.read_input_registers(addr, count).await)
    }

    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError> {
        flatten(self.context()?.write_single_coil(addr, value).await)
    }

    async fn write_register(&mut self, addr: u16, value: u16) -> Result<(), TransportError> {
        flatten(self.context()?.write_single_register(addr, value).await)
    }
}

/// Owns the transport handle and drives the reconnect state machine.
///
/// The last error class is sticky: a connection-class fault observed by any
/// operation makes the next [`ensure_connected`](Self::ensure_connected)
/// close the stale handle and dial again. Protocol-class faults leave the
/// connection up.
pub struct ConnectionManager<T> {
    transport: T,
    connected: bool,
    last_error: ErrorClass,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            connected: false,
            last_error: ErrorClass::None,
        }
    }

    /// Classification of the most recent operation.
    pub fn last_error(&self) -> ErrorClass {
        self.last_error
    }

    /// Access to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect if disconnected, or reconnect after a connection-class fault.
    ///
    /// A failed connect leaves the error class sticky, so the next call
    /// retries; reconnect failures are never fatal to the process.
    pub async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.connected && self.last_error != ErrorClass::Connection {
            return Ok(());
        }

        if self.connected {
            if let Err(e) = self.transport.close().await {
                debug!("closing stale connection failed: {}", e);
            }
            self.connected = false;
        }

        match self.transport.connect().await {
            Ok(()) => {
                self.connected = true;
                self.last_error = ErrorClass::None;
                Ok(())
            }
            Err(e) => {
                self.last_error = ErrorClass::Connection;
                Err(TransportError::Io(e))
            }
        }
    }

    /// Read one register group, classifying the outcome. Bit kinds widen to
    /// one unsigned word per point.
    pub async fn read(
        &mut self,
        kind: RegisterKind,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let result = match kind {
            RegisterKind::Coil => self.transport.read_coils(addr, count).await.map(widen),
            RegisterKind::DiscreteInput => self
                .transport
                .read_discrete_inputs(addr, count)
                .await
                .map(widen),
            RegisterKind::HoldingRegister => {
                self.transport.read_holding_registers(addr, count).await
            }
            RegisterKind::InputRegister => self.transport.read_input_registers(addr, count).await,
        };
        self.observe(result)
    }

    /// Apply one write, classifying the outcome. Coil writes treat any
    /// non-zero value as on.
    pub async fn write(
        &mut self,
        target: WriteTarget,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let result = match target {
            WriteTarget::Coil => self.transport.write_coil(address, value != 0).await,
            WriteTarget::HoldingRegister => self.transport.write_register(address, value).await,
        };
        self.observe(result)
    }

    fn observe<V>(&mut self, result: Result<V, TransportError>) -> Result<V, TransportError> {
        self.last_error = match &result {
            Ok(_) => ErrorClass::None,
            Err(e) => e.class(),
        };
        result
    }

    /// Close the handle; used at shutdown.
    pub async fn close(&mut self) {
        if self.connected {
            let _ = self.transport.close().await;
            self.connected = false;
        }
    }
}

/// Bit reads widen to one unsigned word per point.
fn widen(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}
