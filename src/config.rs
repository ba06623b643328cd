//! Configuration for respkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a respkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── appendonly.aof   (append-only command log)
    pub data_dir: PathBuf,

    /// File name of the append-only log inside `data_dir`
    pub aof_filename: String,

    // -------------------------------------------------------------------------
    // AOF Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the AOF
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,
}

/// AOF sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync inside every append (safest, slowest)
    EveryWrite,

    /// fsync from a background task on a fixed period
    Interval { millis: u64 },

    /// never fsync explicitly; the OS decides (the log is still synced on close)
    Never,
}

impl SyncStrategy {
    /// Period of the background sync task, if this strategy needs one
    pub fn interval(&self) -> Option<Duration> {
        match self {
            SyncStrategy::Interval { millis } => Some(Duration::from_millis(*millis)),
            _ => None,
        }
    }

    /// Parse the redis-style `appendfsync` names: `always`, `everysec`, `no`
    pub fn from_name(name: &str, interval_ms: u64) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncStrategy::EveryWrite),
            "everysec" => Ok(SyncStrategy::Interval { millis: interval_ms }),
            "no" => Ok(SyncStrategy::Never),
            other => Err(KvError::Config(format!("unknown sync strategy '{}'", other))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./respkv_data"),
            aof_filename: "appendonly.aof".to_string(),
            sync_strategy: SyncStrategy::Interval { millis: 1000 },
            listen_addr: "127.0.0.1:6379".to_string(),
            max_connections: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full path of the append-only log
    pub fn aof_path(&self) -> PathBuf {
        self.data_dir.join(&self.aof_filename)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if let SyncStrategy::Interval { millis: 0 } = self.sync_strategy {
            return Err(KvError::Config("sync interval must be greater than zero".to_string()));
        }
        if self.aof_filename.is_empty() {
            return Err(KvError::Config("aof filename must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config("max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the AOF file name
    pub fn aof_filename(mut self, name: impl Into<String>) -> Self {
        self.config.aof_filename = name.into();
        self
    }

    /// Set the AOF sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
