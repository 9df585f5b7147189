//! Storage capability traits.
//!
//! The store is split into five independent operation groups plus a
//! lifecycle. Backends (fjall, in-memory) implement all of them;
//! `PersistentStore` names the full set.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::Result;
use super::models::{PublishEvent, StoredMessage};
use crate::protocol::{PacketId, QoS};
use crate::topic::{topic_matches_filter, Subscription};

// ============================================================================
// Retained messages
// ============================================================================

#[async_trait]
pub trait RetainedStore: Send + Sync {
    /// Upsert the retained message for an exact topic.
    /// An empty payload removes the retained message.
    async fn store_retained(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()>;

    /// Return every retained message whose topic satisfies `condition`.
    /// The condition is only used for filtering.
    async fn search_matching(
        &self,
        condition: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<Vec<StoredMessage>>;

    /// Get the retained message for an exact topic
    async fn get_retained(&self, topic: &str) -> Result<Option<StoredMessage>>;

    /// Remove the retained message for an exact topic
    async fn clean_retained(&self, topic: &str) -> Result<()>;

    /// Retained messages matching a subscription filter
    async fn search_by_filter(&self, filter: &str) -> Result<Vec<StoredMessage>> {
        self.search_matching(&|topic: &str| topic_matches_filter(topic, filter))
            .await
    }
}

// ============================================================================
// QoS 2 exchanges
// ============================================================================

#[async_trait]
pub trait Qos2Store: Send + Sync {
    /// Persist an in-flight QoS 2 publish.
    ///
    /// Persisting the same event twice under a key is a no-op; a different
    /// event under an occupied key fails with `Conflict`.
    async fn persist_qos2_message(&self, key: &str, event: &PublishEvent) -> Result<()>;

    /// Retrieve an in-flight QoS 2 publish, `NotFound` if absent
    async fn retrieve_qos2_message(&self, key: &str) -> Result<PublishEvent>;

    /// Remove an in-flight QoS 2 publish once the handshake completes
    async fn remove_qos2_message(&self, key: &str) -> Result<()>;
}

// ============================================================================
// Pending session messages
// ============================================================================

#[async_trait]
pub trait SessionMessageStore: Send + Sync {
    /// Queue a publish for `event.client_id`, after any already queued
    async fn store_publish_for_future(&self, event: &PublishEvent) -> Result<()>;

    /// Queued publishes for a client, oldest first
    async fn list_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>>;

    /// Remove and return queued publishes for a client, oldest first
    async fn drain_messages_in_session(&self, client_id: &str) -> Result<Vec<PublishEvent>>;

    /// Discard queued publishes for a client
    async fn drop_messages_in_session(&self, client_id: &str) -> Result<()>;
}

// ============================================================================
// Packet identifiers
// ============================================================================

#[async_trait]
pub trait PacketIdStore: Send + Sync {
    /// Allocate the next packet identifier for a client.
    ///
    /// Starts at 1, increments by one and wraps from 65535 back to 1.
    async fn next_packet_id(&self, client_id: &str) -> Result<PacketId>;
}

// ============================================================================
// Subscriptions
// ============================================================================

#[async_trait]
pub trait SessionsStore: Send + Sync {
    /// Store or replace (by client and filter) a subscription
    async fn add_new_subscription(&self, subscription: &Subscription, client_id: &str)
        -> Result<()>;

    /// Remove one subscription
    async fn remove_subscription(&self, filter: &str, client_id: &str) -> Result<()>;

    /// Remove every subscription of a client and forget the session
    async fn wipe_subscriptions(&self, client_id: &str) -> Result<()>;

    /// Replace every subscription of a client
    async fn update_subscriptions(
        &self,
        client_id: &str,
        subscriptions: &HashSet<Subscription>,
    ) -> Result<()>;

    /// All stored subscriptions, in no particular order
    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// True if the client has a stored session (added or updated, not wiped)
    async fn contains(&self, client_id: &str) -> Result<bool>;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[async_trait]
pub trait StoreLifecycle: Send + Sync {
    /// Open the backend. Data operations fail with `NotInitialized` before this.
    async fn init_store(&self) -> Result<()>;

    /// Flush all pending writes to disk
    async fn flush(&self) -> Result<()>;

    /// Wait for in-flight operations, flush and release the backend.
    /// Data operations fail with `Closed` afterwards until `init_store`.
    async fn close(&self) -> Result<()>;

    /// True between `init_store` and `close`
    fn is_open(&self) -> bool;
}

/// The complete store: every operation group plus lifecycle
pub trait PersistentStore:
    RetainedStore + Qos2Store + SessionMessageStore + PacketIdStore + SessionsStore + StoreLifecycle
{
}

impl<T> PersistentStore for T where
    T: RetainedStore
        + Qos2Store
        + SessionMessageStore
        + PacketIdStore
        + SessionsStore
        + StoreLifecycle
{
}
