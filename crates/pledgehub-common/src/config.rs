//! Configuration types for PledgeHub
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for PledgeHub
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// On-disk layout configuration
    pub storage: StorageConfig,
    /// Disk synchronization configuration
    pub sync: SyncConfig,
}

/// HTTP listener configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub listen_host: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port: 3002,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }
}

/// Storage layout configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; `db.json` lives here
    pub root: PathBuf,
    /// Name of the directory under `root` holding collections and shards
    pub data_dir_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_dir_name: "data".to_string(),
        }
    }
}

/// Disk synchronization configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Rewrite only the touched flat collection for feedback/admin writes
    /// instead of running a full reconciliation
    pub scoped: bool,
    /// Quiet period before a pending sync runs (milliseconds, 0 = none)
    pub debounce_ms: u64,
}
