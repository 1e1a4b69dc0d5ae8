//! Modbus relay binary.
//!
//! `collect` polls a Modbus slave on a fixed interval and emits one encoded
//! record per tick on stdout; `apply` reads a batch of write records from
//! stdin and applies them to the slave.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use modbus_relay::config::RelayConfig;
use modbus_relay::connection::{ConnectionManager, ModbusTransport};
use modbus_relay::serialization::detect_format;
use modbus_relay::writer::{ApplyOutcome, WriteApplier, decode_batch};
use modbus_relay::{LoggingConfig, PollCollector};

/// Modbus relay (TCP/RTU): poll register groups, apply write batches.
#[derive(Parser, Debug)]
#[command(name = "modbus-relay")]
#[command(about = "Polls Modbus slaves and relays timestamped records")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "relay.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the configured register groups, one record per tick on stdout.
    Collect,
    /// Read a write batch from stdin and apply it to the slave.
    Apply,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = RelayConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    modbus_relay::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting modbus-relay");
    info!("Loaded configuration from {:?}", args.config);

    let transport = ModbusTransport::new(
        config.connection()?,
        config.unit_id,
        Duration::from_millis(config.timeout_ms),
    );
    let conn = ConnectionManager::new(transport);

    match args.command {
        Command::Collect => run_collect(config, conn).await,
        Command::Apply => run_apply(config, conn).await,
    }
}

async fn run_collect(config: RelayConfig, conn: ConnectionManager<ModbusTransport>) -> Result<()> {
    let plan = config.scan.plan()?;
    if plan.is_empty() {
        warn!("no register groups enabled, records will be empty");
    }

    let format = config.serialization;
    let interval = Duration::from_secs(config.time_interval);
    let mut collector = PollCollector::new(conn, plan);

    info!(
        "Polling every {}s, emitting {:?} records",
        config.time_interval, format
    );

    let poller = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        if let Err(e) = collector.run(format, interval, &mut stdout).await {
            warn!("poll loop stopped: {}", e);
        }
        collector.close().await;
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    poller.abort();
    info!("Modbus relay stopped");

    Ok(())
}

async fn run_apply(config: RelayConfig, conn: ConnectionManager<ModbusTransport>) -> Result<()> {
    let mut data = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut data)
        .await
        .context("Failed to read batch from stdin")?;

    let format = detect_format(&data);
    let commands = decode_batch(&data, format);
    info!(
        "Decoded {} write command(s) from {:?} batch",
        commands.len(),
        format
    );

    let mut applier = WriteApplier::new(conn);
    let outcome = applier.apply_batch(&commands).await;
    applier.close().await;

    match outcome {
        ApplyOutcome::Applied { written, failed } => {
            info!("Applied {} write(s), {} failed", written, failed);
            Ok(())
        }
        ApplyOutcome::Retry => bail!("could not connect to the slave, batch not applied"),
    }
}
