//! Poll-and-encode pipeline: one record per tick.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::connection::{ConnectionManager, ErrorClass, Transport};
use crate::error::Result;
use crate::record::{FieldValue, Record, Timestamp};
use crate::register::ScanPlan;
use crate::serialization::{self, Format};

/// Polls the scan plan's register groups and assembles per-tick records.
pub struct PollCollector<T> {
    conn: ConnectionManager<T>,
    plan: ScanPlan,
}

impl<T: Transport> PollCollector<T> {
    pub fn new(conn: ConnectionManager<T>, plan: ScanPlan) -> Self {
        Self { conn, plan }
    }

    /// The connection state shared by this collector.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.conn
    }

    /// One tick: read every enabled group in scan order, classifying
    /// failures into the record.
    ///
    /// A connection-class fault aborts the remaining groups; values already
    /// collected stay in the returned partial record and the next tick
    /// reconnects. Protocol-class faults and short reads turn into per-group
    /// error fields and the scan continues.
    pub async fn collect(&mut self) -> Record {
        let mut record = Record::new(Timestamp::now());

        for group in self.plan.groups() {
            if let Err(e) = self.conn.ensure_connected().await {
                warn!("connect failed, emitting partial record: {}", e);
                break;
            }

            match self
                .conn
                .read(group.kind, group.base_address, group.point_count)
                .await
            {
                Ok(values) if values.len() < group.point_count as usize => {
                    record.push(
                        group.kind,
                        FieldValue::error(format!(
                            "short read: expected {} points, got {}",
                            group.point_count,
                            values.len()
                        )),
                    );
                }
                Ok(values) => record.push(group.kind, FieldValue::Values(values)),
                Err(e) => {
                    warn!(
                        "reading {} at address {} failed: {}",
                        group.kind, group.base_address, e
                    );
                    record.push(group.kind, FieldValue::error(e.to_string()));
                    if self.conn.last_error() == ErrorClass::Connection {
                        break;
                    }
                }
            }
        }

        record
    }

    /// Poll on a fixed interval, writing one encoded record per tick.
    pub async fn run<W>(&mut self, format: Format, interval: Duration, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let record = self.collect().await;

            let mut payload = serialization::encode(&record, format)?;
            if format == Format::Json {
                payload.push(b'\n');
            }
            sink.write_all(&payload).await?;
            sink.flush().await?;
            debug!("emitted record with {} field(s)", record.len());

            tokio::time::sleep(interval).await;
        }
    }

    /// Close the connection; used at shutdown.
    pub async fn close(&mut self) {
        self.conn.close().await;
    }
}
