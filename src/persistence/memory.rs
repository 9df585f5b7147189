//! In-memory storage backend.
//!
//! Thread-safe implementation of every storage trait on top of sharded maps.
//! Data survives `close`/`init_store` within the process but is lost on
//! restart. Used in tests and for brokers that do not need durability.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::backend::{
    PacketIdStore, Qos2Store, RetainedStore, SessionMessageStore, SessionsStore, StoreLifecycle,
};
use super::error::{PersistenceError, Result};
use super::lifecycle::Lifecycle;
use super::models::{PublishEvent, StoredMessage};
use crate::protocol::{next_packet_id, PacketId, QoS};
use crate::topic::{validate_topic_name, Subscription};

/// In-memory storage backend implementing all storage traits.
pub struct MemoryBackend {
    lifecycle: Lifecycle<()>,
    retained: DashMap<String, StoredMessage>,
    qos2: DashMap<String, PublishEvent>,
    session_messages: DashMap<String, Vec<PublishEvent>>,
    packet_ids: DashMap<String, PacketId>,
    /// client id -> filter -> subscription; a present key is a known session
    subscriptions: DashMap<String, HashMap<String, Subscription>>,
}

impl MemoryBackend {
    /// Create an unopened in-memory store
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            retained: DashMap::new(),
            qos2: DashMap::new(),
            session_messages: DashMap::new(),
            packet_ids: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Create an in-memory store that is already open
    pub fn open() -> Self {
        Self {
            lifecycle: Lifecycle::opened(()),
            ..Self::new()
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetainedStore for MemoryBackend {
    async fn store_retained(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()> {
        validate_topic_name(topic).map_err(|reason| PersistenceError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        })?;
        let _gate = self.lifecycle.enter()?;

        if payload.is_empty() {
            self.retained.remove(topic);
        } else {
            self.retained.insert(
                topic.to_string(),
                StoredMessage {
                    topic: topic.to_string(),
                    qos,
                    payload,
                },
            );
        }
        Ok(())
    }

    async fn search_matching(
        &self,
        condition: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<Vec<StoredMessage>> {
        let _gate = self.lifecycle.enter()?;
        Ok(self
            .retained
            .iter()
            .filter(|entry| condition(entry.key()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_retained(&self, topic: &str) -> Result<Option<StoredMessage>> {
        let _gate = self.lifecycle.enter()?;
        Ok(self.retained.get(topic).map(|entry| entry.value().clone()))
    }

    async fn clean_retained(&self, topic: &str) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.retained.remove(topic);
        Ok(())
    }
}

#[async_trait]
impl Qos2Store for MemoryBackend {
    async fn persist_qos2_message(&self, key: &str, event: &PublishEvent) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        match self.qos2.entry(key.to_string()) {
            Entry::Occupied(existing) if existing.get() == event => Ok(()),
            Entry::Occupied(_) => Err(PersistenceError::Conflict(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                Ok(())
            }
        }
    }

    async fn retrieve_qos2_message(&self, key: &str) -> Result<PublishEvent> {
        let _gate = self.lifecycle.enter()?;
        self.qos2
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))
    }

    async fn remove_qos2_message(&self, key: &str) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.qos2.remove(key);
        Ok(())
    }
}

#[async_trait]
impl SessionMessageStore for MemoryBackend {
    async fn store_publish_for_future(&self, event: &PublishEvent) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.session_messages
            .entry(event.client_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>> {
        let _gate = self.lifecycle.enter()?;
        Ok(self
            .session_messages
            .get(client_id)
            .map(|queue| queue.value().clone())
            .unwrap_or_default())
    }

    async fn drain_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>> {
        let _gate = self.lifecycle.enter()?;
        Ok(self
            .session_messages
            .remove(client_id)
            .map(|(_, queue)| queue)
            .unwrap_or_default())
    }

    async fn drop_messages_in_session(&self, client_id: &str) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.session_messages.remove(client_id);
        Ok(())
    }
}

#[async_trait]
impl PacketIdStore for MemoryBackend {
    async fn next_packet_id(&self, client_id: &str) -> Result<PacketId> {
        let _gate = self.lifecycle.enter()?;
        let mut last = self.packet_ids.entry(client_id.to_string()).or_insert(0);
        *last = next_packet_id(*last);
        Ok(*last)
    }
}

#[async_trait]
impl SessionsStore for MemoryBackend {
    async fn add_new_subscription(
        &self,
        subscription: &Subscription,
        client_id: &str,
    ) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.subscriptions
            .entry(client_id.to_string())
            .or_default()
            .insert(subscription.filter.to_string(), subscription.clone());
        Ok(())
    }

    async fn remove_subscription(&self, filter: &str, client_id: &str) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        if let Some(mut subs) = self.subscriptions.get_mut(client_id) {
            subs.remove(filter);
        }
        Ok(())
    }

    async fn wipe_subscriptions(&self, client_id: &str) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        self.subscriptions.remove(client_id);
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        client_id: &str,
        subscriptions: &HashSet<Subscription>,
    ) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        let by_filter = subscriptions
            .iter()
            .map(|sub| (sub.filter.to_string(), sub.clone()))
            .collect();
        self.subscriptions.insert(client_id.to_string(), by_filter);
        Ok(())
    }

    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let _gate = self.lifecycle.enter()?;
        Ok(self
            .subscriptions
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect())
    }

    async fn contains(&self, client_id: &str) -> Result<bool> {
        let _gate = self.lifecycle.enter()?;
        Ok(self.subscriptions.contains_key(client_id))
    }
}

#[async_trait]
impl StoreLifecycle for MemoryBackend {
    async fn init_store(&self) -> Result<()> {
        self.lifecycle.open_with(|| Ok(()))?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let _gate = self.lifecycle.enter()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.close_with(|_| Ok(()))?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }
}
