//! Server configuration

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::metrics::SLOW_BATCH_THRESHOLD_MS;

pub const DEFAULT_HOST: &str = "localhost";

/// Well-known port of the root control service
pub const DEFAULT_PORT: u16 = 47470;

/// Worker threads started per service
pub const DEFAULT_WORKERS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host the root control service binds to; also the default host for
    /// graph services
    pub host: String,
    pub port: u16,
    /// Root of the per-service store directories. `None` keeps every graph
    /// in memory only.
    pub data_dir: Option<PathBuf>,
    pub workers: usize,
    pub slow_batch_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: Some(default_data_dir()),
            workers: DEFAULT_WORKERS,
            slow_batch_ms: SLOW_BATCH_THRESHOLD_MS,
        }
    }
}

impl Config {
    /// In-memory configuration, used by tests and embedders
    pub fn ephemeral(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            data_dir: None,
            workers: 4,
            slow_batch_ms: SLOW_BATCH_THRESHOLD_MS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidGraphAddress("host must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(Error::bad_request("at least one worker is required"));
        }
        Ok(())
    }
}

/// `$ZG_HOME/data`, falling back to `~/.zerograph/data`
pub fn default_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("ZG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join("data");
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(".zerograph").join("data"),
        None => PathBuf::from(".zerograph").join("data"),
    }
}
