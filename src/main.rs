//! engine-server binary.
//!
//! Loads configuration (TOML file, then CLI overrides), installs logging and
//! the optional metrics exporter, and serves the demo responder until SIGINT
//! or SIGTERM.

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use engine_server::config::{load_config, EngineConfig};
use engine_server::lifecycle::signals::spawn_signal_handler;
use engine_server::observability::{logging, metrics};
use engine_server::{EngineServer, Shutdown};

use crate::demo::{AppInfo, DemoResponder};

#[derive(Debug, Parser)]
#[command(name = "engine-server", version, about = "Concurrent HTTP/1.1 server")]
struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    hostname: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Listen backlog.
    #[arg(long)]
    backlog: Option<u32>,

    /// Number of worker event loops.
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    max_connections_per_ip: Option<usize>,

    /// Maximum request body size in bytes.
    #[arg(long)]
    max_body_size: Option<usize>,

    /// Idle timeout in seconds, 0 to disable.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Enable the Prometheus exporter on this address.
    #[arg(long)]
    metrics_address: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(hostname) = self.hostname {
            config.server.hostname = hostname;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backlog) = self.backlog {
            config.server.backlog = backlog;
        }
        if let Some(workers) = self.workers {
            config.server.worker_count = workers;
        }
        if let Some(ceiling) = self.max_connections_per_ip {
            config.server.max_connections_per_ip = ceiling;
        }
        if let Some(size) = self.max_body_size {
            config.limits.max_body_size = size;
        }
        if let Some(secs) = self.idle_timeout {
            config.timeouts.idle_secs = secs;
        }
        if let Some(address) = self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = address;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability.log_filter);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "engine-server starting");

    let server = EngineServer::new(config, Arc::new(AppInfo::new("engine-server")))?;

    let observability = &server.config().observability;
    if observability.metrics_enabled {
        if let Ok(addr) = observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    server.run(DemoResponder, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
