//! Topic matching and subscription management
//!
//! Implements topic name/filter validation, a topic trie for efficient
//! subscription matching, and the subscription registry that keeps the trie
//! in step with the subscription store.
//!
//! Performance optimizations:
//! - Uses callback-based matching to avoid intermediate allocations
//! - Uses SmallVec for typical workloads (few matching subscriptions per topic)
//! - Matching never touches the store

mod error;
mod trie;
pub mod validation;


pub use error::SubscriptionError;
pub use trie::TopicTrie;
pub use validation::{
    is_wildcard_filter, parse_levels, topic_matches_filter, validate_topic_filter,
    validate_topic_filter_with_max_levels, validate_topic_name,
    validate_topic_name_with_max_levels, TopicLevel,
};

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::persistence::SessionsStore;
use crate::protocol::QoS;

/// A subscription entry
///
/// Two subscriptions are equal when they share client and filter; QoS and
/// the session flag are the payload replaced on re-subscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Client ID
    pub client_id: Arc<str>,
    /// Topic filter, possibly with wildcards
    pub filter: Arc<str>,
    /// Subscription QoS
    pub qos: QoS,
    /// Whether the owning session is discarded on disconnect
    pub clean_session: bool,
}

impl Subscription {
    pub fn new(
        client_id: impl Into<Arc<str>>,
        filter: impl Into<Arc<str>>,
        qos: QoS,
        clean_session: bool,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            filter: filter.into(),
            qos,
            clean_session,
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id && self.filter == other.filter
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
        self.filter.hash(state);
    }
}

/// Thread-safe subscription index backed by a topic trie and written through
/// to a `SessionsStore`
pub struct SubscriptionRegistry {
    trie: RwLock<TopicTrie<Vec<Subscription>>>,
    store: Arc<dyn SessionsStore>,
    /// Serializes store-then-index mutations of one client. An entry lives
    /// only while some task holds or waits for it.
    client_locks: DashMap<Arc<str>, Arc<Mutex<()>>>,
    max_topic_levels: usize,
}

impl SubscriptionRegistry {
    /// Build the registry from every subscription in `store`
    pub async fn init(store: Arc<dyn SessionsStore>) -> Result<Self, SubscriptionError> {
        Self::init_with_max_topic_levels(store, 0).await
    }

    /// Build the registry, limiting filters added later to `max_topic_levels`
    /// (0 = unlimited). Stored filters are only checked structurally.
    pub async fn init_with_max_topic_levels(
        store: Arc<dyn SessionsStore>,
        max_topic_levels: usize,
    ) -> Result<Self, SubscriptionError> {
        let stored = store.list_all_subscriptions().await?;

        let mut trie = TopicTrie::new();
        for sub in &stored {
            validate_filter(&sub.filter, 0)?;
            insert_into(&mut trie, sub.clone());
        }
        info!("Loaded {} subscriptions", stored.len());

        Ok(Self {
            trie: RwLock::new(trie),
            store,
            client_locks: DashMap::new(),
            max_topic_levels,
        })
    }

    async fn lock_client<'a>(&'a self, client_id: &'a str) -> ClientGuard<'a> {
        let existing = self.client_locks.get(client_id).map(|lock| lock.clone());
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .client_locks
                .entry(Arc::from(client_id))
                .or_default()
                .clone(),
        };
        ClientGuard {
            locks: &self.client_locks,
            client_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Add a subscription, replacing the client's existing one on the same filter
    pub async fn add(&self, subscription: Subscription) -> Result<(), SubscriptionError> {
        validate_filter(&subscription.filter, self.max_topic_levels)?;

        let client_id = subscription.client_id.clone();
        let _guard = self.lock_client(&client_id).await;

        self.store
            .add_new_subscription(&subscription, &subscription.client_id)
            .await?;

        debug!(
            "Client {} subscribed to {} ({})",
            subscription.client_id, subscription.filter, subscription.qos
        );
        insert_into(&mut self.trie.write(), subscription);
        Ok(())
    }

    /// Remove one subscription. Returns true if the client had it.
    pub async fn remove(&self, client_id: &str, filter: &str) -> Result<bool, SubscriptionError> {
        let _guard = self.lock_client(client_id).await;

        self.store.remove_subscription(filter, client_id).await?;

        let mut trie = self.trie.write();
        let Some(subs) = trie.get_mut(filter) else {
            return Ok(false);
        };
        let len_before = subs.len();
        subs.retain(|s| s.client_id.as_ref() != client_id);
        let removed = subs.len() != len_before;
        if subs.is_empty() {
            trie.remove(filter);
        }
        if removed {
            debug!("Client {} unsubscribed from {}", client_id, filter);
        }
        Ok(removed)
    }

    /// Remove every subscription of a client
    pub async fn wipe(&self, client_id: &str) -> Result<(), SubscriptionError> {
        let _guard = self.lock_client(client_id).await;

        self.store.wipe_subscriptions(client_id).await?;
        remove_client(&mut self.trie.write(), client_id);
        debug!("Wiped subscriptions of {}", client_id);
        Ok(())
    }

    /// Replace every subscription of a client with `subscriptions`
    pub async fn update(
        &self,
        client_id: &str,
        subscriptions: HashSet<Subscription>,
    ) -> Result<(), SubscriptionError> {
        for sub in &subscriptions {
            if sub.client_id.as_ref() != client_id {
                return Err(SubscriptionError::ClientMismatch {
                    expected: client_id.to_string(),
                    found: sub.client_id.to_string(),
                });
            }
            validate_filter(&sub.filter, self.max_topic_levels)?;
        }

        let _guard = self.lock_client(client_id).await;

        self.store
            .update_subscriptions(client_id, &subscriptions)
            .await?;

        let count = subscriptions.len();
        let mut trie = self.trie.write();
        remove_client(&mut trie, client_id);
        for sub in subscriptions {
            insert_into(&mut trie, sub);
        }
        debug!("Replaced subscriptions of {} ({} filters)", client_id, count);
        Ok(())
    }

    /// Find all matching subscriptions for a topic
    ///
    /// Performance: Uses SmallVec to avoid heap allocation for typical workloads
    /// (most topics have fewer than 16 subscribers)
    pub fn matches(&self, topic: &str) -> SmallVec<[Subscription; 16]> {
        let mut result = SmallVec::new();
        self.matches_with_callback(topic, |sub| result.push(sub.clone()));
        result
    }

    /// Find all matching subscriptions using a callback to avoid allocation.
    /// The registry is read-locked while the callback runs.
    pub fn matches_with_callback<F>(&self, topic: &str, mut callback: F)
    where
        F: FnMut(&Subscription),
    {
        let trie = self.trie.read();
        trie.matches(topic, |subs| subs.iter().for_each(&mut callback));
    }

    /// All subscriptions of one client
    pub fn subscriptions_of(&self, client_id: &str) -> Vec<Subscription> {
        let mut result = Vec::new();
        self.trie.read().for_each(|subs| {
            result.extend(
                subs.iter()
                    .filter(|s| s.client_id.as_ref() == client_id)
                    .cloned(),
            );
        });
        result
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.trie.read().for_each(|subs| count += subs.len());
        count
    }

    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }
}

/// Holds a client's mutex and drops the map entry once nobody else wants it
struct ClientGuard<'a> {
    locks: &'a DashMap<Arc<str>, Arc<Mutex<()>>>,
    client_id: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ClientGuard<'_> {
    fn drop(&mut self) {
        // The owned guard carries a reference; release it before counting
        self.guard.take();
        self.locks
            .remove_if(self.client_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn validate_filter(filter: &str, max_topic_levels: usize) -> Result<(), SubscriptionError> {
    validate_topic_filter_with_max_levels(filter, max_topic_levels).map_err(|reason| {
        SubscriptionError::InvalidFilter {
            filter: filter.to_string(),
            reason,
        }
    })
}

fn insert_into(trie: &mut TopicTrie<Vec<Subscription>>, subscription: Subscription) {
    let subs = trie.get_or_insert_with(&subscription.filter, Vec::new);
    subs.retain(|s| s.client_id != subscription.client_id);
    subs.push(subscription);
}

fn remove_client(trie: &mut TopicTrie<Vec<Subscription>>, client_id: &str) {
    trie.remove_by_predicate(|subs| {
        subs.retain(|s| s.client_id.as_ref() != client_id);
        subs.is_empty()
    });
}
