//! Persistence module for VibeMQ.
//!
//! Provides durable storage for:
//! - Retained messages
//! - In-flight QoS 2 exchanges
//! - Messages queued for offline sessions
//! - Per-client packet identifiers
//! - Subscriptions
//!
//! Uses a trait-based design allowing different backends:
//! - `FjallBackend` (default) - Local LSM-tree storage
//! - `MemoryBackend` - Process-local maps, for tests and ephemeral brokers
//!
//! Every write is applied to the backend before the call returns. `FlushTask`
//! only controls how often the backend's buffers are synced to disk.

mod backend;
mod error;
mod fjall;
mod lifecycle;
mod locks;
mod memory;
mod models;


pub use backend::{
    PacketIdStore, PersistentStore, Qos2Store, RetainedStore, SessionMessageStore, SessionsStore,
    StoreLifecycle,
};
pub use error::{PersistenceError, Result};
pub use fjall::FjallBackend;
pub use memory::MemoryBackend;
pub use models::{PublishEvent, Qos2Key, StoredMessage};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Background task that periodically flushes a store
pub struct FlushTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl FlushTask {
    /// Spawn the flusher. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn StoreLifecycle>, flush_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self::flush_loop(store, shutdown_rx, flush_interval));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the flusher and return the error that stopped it early, if any.
    ///
    /// Does not close the store.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited on error
        let _ = self.shutdown_tx.send(()).await;
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(PersistenceError::Storage(format!("flush task failed: {}", e))),
        }
    }

    async fn flush_loop(
        store: Arc<dyn StoreLifecycle>,
        mut shutdown_rx: mpsc::Receiver<()>,
        flush_interval: Duration,
    ) -> Result<()> {
        let mut interval = tokio::time::interval(flush_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match store.flush().await {
                        Ok(()) => debug!("Flushed store (interval)"),
                        // Store was closed underneath us, nothing left to flush
                        Err(PersistenceError::Closed) => break,
                        Err(e) => {
                            error!("Failed to flush store: {}", e);
                            return Err(e);
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Flush task received shutdown signal");
                    break;
                }
            }
        }

        info!("Flush task exited");
        Ok(())
    }
}
