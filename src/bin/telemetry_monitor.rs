//! Terminal monitor for the muscle and thermal sensor streams.
//!
//! Prints every connection state change and a periodic status line.
//!
//! Usage:
//!   telemetry-monitor --simulate --duration 30
//!   telemetry-monitor --config telemetry.toml --mode external-bridge

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use biosignal_core::config::{ConfigLoader, ConnectionMode};
use biosignal_core::monitor::TelemetryMonitor;
use biosignal_core::utils::time::SystemTimeProvider;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Network,
    DirectLink,
    ExternalBridge,
}

impl From<ModeArg> for ConnectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Network => ConnectionMode::Network,
            ModeArg::DirectLink => ConnectionMode::DirectLink,
            ModeArg::ExternalBridge => ConnectionMode::ExternalBridge,
        }
    }
}

/// Live liveness and signal monitor for the biosensor pair.
#[derive(Parser)]
#[command(name = "telemetry-monitor", version, about = "Watch muscle and thermal sensor telemetry")]
struct Cli {
    /// TOML configuration file layered over the defaults.
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured connection mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Use simulated sensors instead of HTTP transports.
    #[arg(long)]
    simulate: bool,

    /// Stop after this many seconds; runs until Ctrl-C when omitted.
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Seconds between status lines.
    #[arg(long, default_value = "5")]
    status_every: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_paths(vec![path.clone()]),
        None => ConfigLoader::new(),
    };
    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Cannot load configuration");
            process::exit(1);
        }
    };
    if let Some(mode) = cli.mode {
        config.connection.mode = mode.into();
    }

    let mut monitor = match TelemetryMonitor::new(config, Arc::new(SystemTimeProvider)) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            process::exit(1);
        }
    };

    let mut changes = monitor.subscribe_changes();
    if cli.simulate {
        monitor.start_simulated();
    } else if let Err(e) = monitor.start().await {
        error!(error = %e, "Cannot start acquisition");
        process::exit(1);
    }

    let deadline = async {
        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut status_tick = tokio::time::interval(Duration::from_secs(cli.status_every.max(1)));

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => println!("[{}] {} -> {}", change.stream, change.from, change.to),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed state changes"),
                Err(RecvError::Closed) => break,
            },
            _ = status_tick.tick() => {
                let status = monitor.status();
                let thermal = monitor.thermal();
                let thermal = thermal.lock();
                let average = thermal.latest().map(|frame| format!("{:.1}{}", frame.average, frame.unit));
                println!(
                    "muscle={} ({} samples) thermal={} avg={} parse_errors={}",
                    status.muscle,
                    status.muscle_samples,
                    status.thermal,
                    average.as_deref().unwrap_or("-"),
                    status.parse_errors,
                );
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    monitor.shutdown();
}
