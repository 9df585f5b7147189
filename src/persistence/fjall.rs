//! Fjall-based storage backend implementation.
//!
//! Uses fjall (an LSM-tree based embedded database) for local persistence.
//! Each operation group lives in its own partition:
//!
//! | partition          | key                          | value                |
//! |--------------------|------------------------------|----------------------|
//! | `retained`         | topic                        | `RetainedRecord`     |
//! | `qos2`             | exchange key                 | `PublishRecord`      |
//! | `session_messages` | client prefix + seq (u64 BE) | `PublishRecord`      |
//! | `packet_ids`       | client id                    | last id (u16 BE)     |
//! | `subscriptions`    | client prefix + filter       | `SubscriptionRecord` |
//! | `sessions`         | client id                    | empty                |
//!
//! The client prefix is the client id's length (u32 BE) followed by its
//! bytes, so one client's range never contains another client's keys.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tracing::{debug, info, trace};

use super::backend::{
    PacketIdStore, Qos2Store, RetainedStore, SessionMessageStore, SessionsStore, StoreLifecycle,
};
use super::error::{PersistenceError, Result};
use super::lifecycle::Lifecycle;
use super::locks::KeyLocks;
use super::models::{
    PublishEvent, PublishRecord, RetainedRecord, StoredMessage, SubscriptionRecord,
};
use crate::protocol::{next_packet_id, PacketId, QoS};
use crate::topic::{validate_topic_name, Subscription};

/// Open keyspace and partitions
struct Partitions {
    keyspace: Keyspace,
    retained: PartitionHandle,
    qos2: PartitionHandle,
    session_messages: PartitionHandle,
    packet_ids: PartitionHandle,
    subscriptions: PartitionHandle,
    sessions: PartitionHandle,
}

impl Partitions {
    fn open(path: &Path) -> Result<Self> {
        let keyspace = Config::new(path).open()?;

        let retained = keyspace.open_partition("retained", PartitionCreateOptions::default())?;
        let qos2 = keyspace.open_partition("qos2", PartitionCreateOptions::default())?;
        let session_messages =
            keyspace.open_partition("session_messages", PartitionCreateOptions::default())?;
        let packet_ids = keyspace.open_partition("packet_ids", PartitionCreateOptions::default())?;
        let subscriptions =
            keyspace.open_partition("subscriptions", PartitionCreateOptions::default())?;
        let sessions = keyspace.open_partition("sessions", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            retained,
            qos2,
            session_messages,
            packet_ids,
            subscriptions,
            sessions,
        })
    }
}

/// Fjall-based storage backend
pub struct FjallBackend {
    path: PathBuf,
    persist_mode: PersistMode,
    lifecycle: Lifecycle<Partitions>,
    /// Last issued packet id per client; the entry is the per-client lock
    packet_ids: DashMap<String, PacketId>,
    /// Next queue sequence number per client; the entry is the per-client lock
    session_seqs: DashMap<String, u64>,
    /// Per-client lock for multi-key subscription writes
    subscription_locks: KeyLocks,
    /// Per-key lock for QoS 2 check-and-insert
    qos2_locks: KeyLocks,
}

impl FjallBackend {
    /// Create a backend for the given path. Nothing is opened until `init_store`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            persist_mode: PersistMode::SyncAll,
            lifecycle: Lifecycle::new(),
            packet_ids: DashMap::new(),
            session_seqs: DashMap::new(),
            subscription_locks: KeyLocks::new(),
            qos2_locks: KeyLocks::new(),
        }
    }

    /// Durability level used by `flush`; `close` always syncs everything
    pub fn with_persist_mode(mut self, mode: PersistMode) -> Self {
        self.persist_mode = mode;
        self
    }

    /// Create and open a fjall backend at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let backend = Self::new(path);
        backend.open_partitions()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_partitions(&self) -> Result<()> {
        let opened = self.lifecycle.open_with(|| {
            // Cached counters may be stale after a previous close
            self.packet_ids.clear();
            self.session_seqs.clear();
            Partitions::open(&self.path)
        })?;
        if opened {
            info!("Opened fjall store at {:?}", self.path);
        }
        Ok(())
    }

    /// Serialize a value using bincode
    fn serialize<T: bincode::Encode>(value: &T) -> Result<Vec<u8>> {
        bincode::encode_to_vec(value, bincode::config::standard()).map_err(PersistenceError::from)
    }

    /// Deserialize a value using bincode
    fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(PersistenceError::from)
    }
}

/// Length-prefixed client id, the common prefix of a client's keys
fn client_prefix(client_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + client_id.len() + 8);
    key.extend_from_slice(&(client_id.len() as u32).to_be_bytes());
    key.extend_from_slice(client_id.as_bytes());
    key
}

fn session_message_key(prefix: &[u8], seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn subscription_key(client_id: &str, filter: &str) -> Vec<u8> {
    let mut key = client_prefix(client_id);
    key.extend_from_slice(filter.as_bytes());
    key
}

/// Sequence number one past the last queued message of a client
fn next_session_seq(partition: &PartitionHandle, prefix: &[u8]) -> Result<u64> {
    match partition.prefix(prefix).next_back().transpose()? {
        Some((key, _)) => {
            let seq_bytes: [u8; 8] = key[prefix.len()..]
                .try_into()
                .map_err(|_| PersistenceError::Corruption("malformed session message key".into()))?;
            Ok(u64::from_be_bytes(seq_bytes) + 1)
        }
        None => Ok(0),
    }
}

fn decode_packet_id(bytes: &[u8]) -> Result<PacketId> {
    let raw: [u8; 2] = bytes
        .try_into()
        .map_err(|_| PersistenceError::Corruption("malformed packet id".into()))?;
    Ok(PacketId::from_be_bytes(raw))
}

#[async_trait]
impl RetainedStore for FjallBackend {
    async fn store_retained(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()> {
        validate_topic_name(topic).map_err(|reason| PersistenceError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        })?;
        let parts = self.lifecycle.enter()?;

        if payload.is_empty() {
            parts.retained.remove(topic)?;
            trace!("Cleared retained message on {}", topic);
            return Ok(());
        }

        let message = StoredMessage {
            topic: topic.to_string(),
            qos,
            payload,
        };
        let bytes = Self::serialize(&RetainedRecord::from(&message))?;
        parts.retained.insert(topic, bytes)?;
        Ok(())
    }

    async fn search_matching(
        &self,
        condition: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<Vec<StoredMessage>> {
        let parts = self.lifecycle.enter()?;
        let mut result = Vec::new();
        for item in parts.retained.iter() {
            let (key, value) = item?;
            let topic = std::str::from_utf8(&key)
                .map_err(|_| PersistenceError::Corruption("retained topic is not UTF-8".into()))?;
            if condition(topic) {
                let record: RetainedRecord = Self::deserialize(&value)?;
                result.push(StoredMessage::try_from(record)?);
            }
        }
        Ok(result)
    }

    async fn get_retained(&self, topic: &str) -> Result<Option<StoredMessage>> {
        let parts = self.lifecycle.enter()?;
        match parts.retained.get(topic)? {
            Some(bytes) => {
                let record: RetainedRecord = Self::deserialize(&bytes)?;
                Ok(Some(StoredMessage::try_from(record)?))
            }
            None => Ok(None),
        }
    }

    async fn clean_retained(&self, topic: &str) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        parts.retained.remove(topic)?;
        Ok(())
    }
}

#[async_trait]
impl Qos2Store for FjallBackend {
    async fn persist_qos2_message(&self, key: &str, event: &PublishEvent) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        let bytes = Self::serialize(&PublishRecord::from(event))?;

        self.qos2_locks.with(key, || -> Result<()> {
            if let Some(existing) = parts.qos2.get(key)? {
                if *existing == *bytes {
                    return Ok(());
                }
                return Err(PersistenceError::Conflict(key.to_string()));
            }
            parts.qos2.insert(key, bytes)?;
            trace!("Persisted QoS 2 exchange {}", key);
            Ok(())
        })
    }

    async fn retrieve_qos2_message(&self, key: &str) -> Result<PublishEvent> {
        let parts = self.lifecycle.enter()?;
        let bytes = parts
            .qos2
            .get(key)?
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))?;
        let record: PublishRecord = Self::deserialize(&bytes)?;
        PublishEvent::try_from(record)
    }

    async fn remove_qos2_message(&self, key: &str) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        self.qos2_locks.with(key, || -> Result<()> {
            parts.qos2.remove(key)?;
            Ok(())
        })
    }
}

#[async_trait]
impl SessionMessageStore for FjallBackend {
    async fn store_publish_for_future(&self, event: &PublishEvent) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        let prefix = client_prefix(&event.client_id);
        let bytes = Self::serialize(&PublishRecord::from(event))?;

        // Holding the entry orders concurrent appends for the same client
        let mut seq = match self.session_seqs.entry(event.client_id.clone()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                let next = next_session_seq(&parts.session_messages, &prefix)?;
                entry.insert(next)
            }
        };
        parts
            .session_messages
            .insert(session_message_key(&prefix, *seq), bytes)?;
        *seq += 1;
        Ok(())
    }

    async fn list_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>> {
        let parts = self.lifecycle.enter()?;
        let mut result = Vec::new();
        for item in parts.session_messages.prefix(client_prefix(client_id)) {
            let (_, value) = item?;
            let record: PublishRecord = Self::deserialize(&value)?;
            result.push(PublishEvent::try_from(record)?);
        }
        Ok(result)
    }

    async fn drain_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>> {
        let parts = self.lifecycle.enter()?;
        let _lock = self.session_seqs.entry(client_id.to_string());

        let mut batch = parts.keyspace.batch();
        let mut result = Vec::new();
        for item in parts.session_messages.prefix(client_prefix(client_id)) {
            let (key, value) = item?;
            let record: PublishRecord = Self::deserialize(&value)?;
            result.push(PublishEvent::try_from(record)?);
            batch.remove(&parts.session_messages, key);
        }
        batch.commit()?;

        debug!("Drained {} queued messages for {}", result.len(), client_id);
        Ok(result)
    }

    async fn drop_messages_in_session(&self, client_id: &str) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        let _lock = self.session_seqs.entry(client_id.to_string());

        let mut batch = parts.keyspace.batch();
        for item in parts.session_messages.prefix(client_prefix(client_id)) {
            let (key, _) = item?;
            batch.remove(&parts.session_messages, key);
        }
        batch.commit()?;
        Ok(())
    }
}

#[async_trait]
impl PacketIdStore for FjallBackend {
    async fn next_packet_id(&self, client_id: &str) -> Result<PacketId> {
        let parts = self.lifecycle.enter()?;

        let mut last = match self.packet_ids.entry(client_id.to_string()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                let stored = match parts.packet_ids.get(client_id)? {
                    Some(bytes) => decode_packet_id(&bytes)?,
                    None => 0,
                };
                entry.insert(stored)
            }
        };

        let next = next_packet_id(*last);
        parts.packet_ids.insert(client_id, next.to_be_bytes().to_vec())?;
        *last = next;
        Ok(next)
    }
}

impl FjallBackend {
    /// Queue removal of every subscription key of a client into `batch`
    fn remove_client_subscriptions(
        parts: &Partitions,
        batch: &mut fjall::Batch,
        client_id: &str,
    ) -> Result<()> {
        for item in parts.subscriptions.prefix(client_prefix(client_id)) {
            let (key, _) = item?;
            batch.remove(&parts.subscriptions, key);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionsStore for FjallBackend {
    async fn add_new_subscription(
        &self,
        subscription: &Subscription,
        client_id: &str,
    ) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        let bytes = Self::serialize(&SubscriptionRecord::from(subscription))?;
        self.subscription_locks.with(client_id, || -> Result<()> {
            let mut batch = parts.keyspace.batch();
            batch.insert(
                &parts.subscriptions,
                subscription_key(client_id, &subscription.filter),
                bytes,
            );
            batch.insert(&parts.sessions, client_id, Vec::<u8>::new());
            batch.commit()?;
            Ok(())
        })
    }

    async fn remove_subscription(&self, filter: &str, client_id: &str) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        self.subscription_locks.with(client_id, || -> Result<()> {
            parts.subscriptions.remove(subscription_key(client_id, filter))?;
            Ok(())
        })
    }

    async fn wipe_subscriptions(&self, client_id: &str) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        self.subscription_locks.with(client_id, || -> Result<()> {
            let mut batch = parts.keyspace.batch();
            Self::remove_client_subscriptions(&parts, &mut batch, client_id)?;
            batch.remove(&parts.sessions, client_id);
            batch.commit()?;
            debug!("Wiped subscriptions of {}", client_id);
            Ok(())
        })
    }

    async fn update_subscriptions(
        &self,
        client_id: &str,
        subscriptions: &HashSet<Subscription>,
    ) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        self.subscription_locks.with(client_id, || -> Result<()> {
            let mut batch = parts.keyspace.batch();
            Self::remove_client_subscriptions(&parts, &mut batch, client_id)?;
            for subscription in subscriptions {
                let bytes = Self::serialize(&SubscriptionRecord::from(subscription))?;
                batch.insert(
                    &parts.subscriptions,
                    subscription_key(client_id, &subscription.filter),
                    bytes,
                );
            }
            batch.insert(&parts.sessions, client_id, Vec::<u8>::new());
            batch.commit()?;
            Ok(())
        })
    }

    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let parts = self.lifecycle.enter()?;
        let mut result = Vec::new();
        for item in parts.subscriptions.iter() {
            let (_, value) = item?;
            let record: SubscriptionRecord = Self::deserialize(&value)?;
            result.push(Subscription::try_from(record)?);
        }
        Ok(result)
    }

    async fn contains(&self, client_id: &str) -> Result<bool> {
        let parts = self.lifecycle.enter()?;
        Ok(parts.sessions.contains_key(client_id)?)
    }
}

#[async_trait]
impl StoreLifecycle for FjallBackend {
    async fn init_store(&self) -> Result<()> {
        self.open_partitions()
    }

    async fn flush(&self) -> Result<()> {
        let parts = self.lifecycle.enter()?;
        parts.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let closed = self.lifecycle.close_with(|parts| {
            parts.keyspace.persist(PersistMode::SyncAll)?;
            Ok(())
        })?;
        if closed {
            // fjall handles cleanup on drop
            self.packet_ids.clear();
            self.session_seqs.clear();
            info!("Closed fjall store at {:?}", self.path);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }
}
