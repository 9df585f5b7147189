//! VibeMQ core - subscription matching and session persistence
//!
//! The parts of an MQTT broker that decide who receives a publish and what
//! survives a restart: topic validation and matching, the subscription
//! registry, and the persistent store for retained messages, QoS 2
//! exchanges, queued session messages, packet identifiers and subscriptions.

pub mod config;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod topic;

pub use config::Config;
pub use error::ErrorKind;
pub use persistence::{
    FjallBackend, FlushTask, MemoryBackend, PersistenceError, PersistentStore, PublishEvent,
    Qos2Key, StoredMessage,
};
pub use protocol::{PacketId, QoS};
pub use topic::{topic_matches_filter, Subscription, SubscriptionError, SubscriptionRegistry};
