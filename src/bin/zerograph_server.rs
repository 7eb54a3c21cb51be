//! Zerograph server binary
//!
//! Starts the root control service and serves until SIGINT or SIGTERM,
//! then stops every graph service and flushes its store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zerograph::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_WORKERS};
use zerograph::metrics::SLOW_BATCH_THRESHOLD_MS;
use zerograph::{Config, Server};

#[derive(Parser, Debug)]
#[command(name = "zerograph-server", version, about = "Batch-transactional graph resource server")]
struct Args {
    /// Host of the root control service, and default host of graph services
    #[arg(long, env = "ZG_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port of the root control service
    #[arg(long, env = "ZG_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Worker threads per service
    #[arg(long, env = "ZG_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Zerograph home; graph stores live under `<home>/data`
    #[arg(long, env = "ZG_HOME")]
    home: Option<PathBuf>,

    /// Keep every graph in memory only
    #[arg(long, conflicts_with = "home")]
    ephemeral: bool,

    /// Batches at least this slow are logged and reported
    #[arg(long, default_value_t = SLOW_BATCH_THRESHOLD_MS)]
    slow_batch_ms: u64,
}

impl Args {
    fn into_config(self) -> Config {
        let data_dir = if self.ephemeral {
            None
        } else {
            Some(match self.home {
                Some(home) => home.join("data"),
                None => zerograph::config::default_data_dir(),
            })
        };
        Config {
            host: self.host,
            port: self.port,
            data_dir,
            workers: self.workers,
            slow_batch_ms: self.slow_batch_ms,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    info!(version = env!("CARGO_PKG_VERSION"), host = %config.host, port = config.port, "Starting zerograph-server");

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let server = Server::start(config).context("Failed to start the control service")?;
    info!(addr = %server.local_addr(), "Listening");

    if let Some(signal) = signals.forever().next() {
        info!(signal, "Received signal, shutting down");
    }
    server.shutdown();
    info!("Exiting");
    Ok(())
}
