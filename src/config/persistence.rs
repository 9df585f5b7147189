//! Persistence configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::persistence::FjallBackend;

/// Backend type for persistence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Fjall (local LSM-tree storage)
    #[default]
    Fjall,
    /// Process memory, lost on exit
    Memory,
}

/// How far a periodic flush pushes data towards the disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Hand buffers to the OS
    Buffer,
    /// fdatasync the journal
    SyncData,
    /// fsync the journal
    #[default]
    SyncAll,
}

impl From<PersistMode> for fjall::PersistMode {
    fn from(mode: PersistMode) -> Self {
        match mode {
            PersistMode::Buffer => fjall::PersistMode::Buffer,
            PersistMode::SyncData => fjall::PersistMode::SyncData,
            PersistMode::SyncAll => fjall::PersistMode::SyncAll,
        }
    }
}

fn default_flush_interval() -> Duration {
    Duration::from_millis(100)
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Backend type
    pub backend: BackendType,

    /// Data directory path (for fjall)
    pub path: PathBuf,

    /// Flush interval (e.g., "100ms", "1s")
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Durability of periodic flushes; closing always syncs everything
    pub persist_mode: PersistMode,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Fjall,
            path: PathBuf::from("./data"),
            flush_interval: default_flush_interval(),
            persist_mode: PersistMode::SyncAll,
        }
    }
}

impl PersistenceConfig {
    /// Unopened fjall backend for the configured path and persist mode
    pub fn fjall_backend(&self) -> FjallBackend {
        FjallBackend::new(&self.path).with_persist_mode(self.persist_mode.into())
    }
}
