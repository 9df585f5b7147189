//! Records exchanged with the store, and their serialized forms.
//!
//! `StoredMessage` and `PublishEvent` are what callers see. The `*Record`
//! types are storage-friendly versions encoded with bincode by the fjall
//! backend.

use std::fmt;

use bincode::{Decode, Encode};
use bytes::Bytes;

use super::error::{PersistenceError, Result};
use crate::protocol::{PacketId, QoS};
use crate::topic::Subscription;

/// A retained message as returned by `search_matching`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub qos: QoS,
    pub payload: Bytes,
}

/// A publish tracked on behalf of a client: an in-flight QoS 2 exchange or a
/// message queued for an offline session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEvent {
    pub topic: String,
    pub qos: QoS,
    pub payload: Bytes,
    pub retain: bool,
    pub client_id: String,
    pub packet_id: PacketId,
}

impl PublishEvent {
    pub fn new(
        topic: impl Into<String>,
        qos: QoS,
        payload: impl Into<Bytes>,
        retain: bool,
        client_id: impl Into<String>,
        packet_id: PacketId,
    ) -> Self {
        Self {
            topic: topic.into(),
            qos,
            payload: payload.into(),
            retain,
            client_id: client_id.into(),
            packet_id,
        }
    }

    /// Key this event's QoS 2 exchange is stored under
    pub fn qos2_key(&self) -> Qos2Key {
        Qos2Key::new(&self.client_id, self.packet_id)
    }
}

/// Composite key of an in-flight QoS 2 exchange: `{client_id}:{packet_id}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qos2Key(String);

impl Qos2Key {
    pub fn new(client_id: &str, packet_id: PacketId) -> Self {
        Self(format!("{}:{}", client_id, packet_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Qos2Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Qos2Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Serialized forms
// ============================================================================

/// Stored retained message
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct RetainedRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
}

/// Stored publish event (QoS 2 exchange or queued session message)
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PublishRecord {
    pub topic: String,
    pub qos: u8,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub client_id: String,
    pub packet_id: u16,
}

/// Stored subscription
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct SubscriptionRecord {
    pub client_id: String,
    pub filter: String,
    pub qos: u8,
    pub clean_session: bool,
}

fn decode_qos(qos: u8) -> Result<QoS> {
    QoS::from_u8(qos).ok_or_else(|| PersistenceError::Corruption(format!("invalid QoS {}", qos)))
}

impl From<&StoredMessage> for RetainedRecord {
    fn from(message: &StoredMessage) -> Self {
        Self {
            topic: message.topic.clone(),
            payload: message.payload.to_vec(),
            qos: message.qos as u8,
        }
    }
}

impl TryFrom<RetainedRecord> for StoredMessage {
    type Error = PersistenceError;

    fn try_from(record: RetainedRecord) -> Result<Self> {
        Ok(Self {
            topic: record.topic,
            qos: decode_qos(record.qos)?,
            payload: Bytes::from(record.payload),
        })
    }
}

impl From<&PublishEvent> for PublishRecord {
    fn from(event: &PublishEvent) -> Self {
        Self {
            topic: event.topic.clone(),
            qos: event.qos as u8,
            payload: event.payload.to_vec(),
            retain: event.retain,
            client_id: event.client_id.clone(),
            packet_id: event.packet_id,
        }
    }
}

impl TryFrom<PublishRecord> for PublishEvent {
    type Error = PersistenceError;

    fn try_from(record: PublishRecord) -> Result<Self> {
        Ok(Self {
            topic: record.topic,
            qos: decode_qos(record.qos)?,
            payload: Bytes::from(record.payload),
            retain: record.retain,
            client_id: record.client_id,
            packet_id: record.packet_id,
        })
    }
}

impl From<&Subscription> for SubscriptionRecord {
    fn from(sub: &Subscription) -> Self {
        Self {
            client_id: sub.client_id.to_string(),
            filter: sub.filter.to_string(),
            qos: sub.qos as u8,
            clean_session: sub.clean_session,
        }
    }
}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = PersistenceError;

    fn try_from(record: SubscriptionRecord) -> Result<Self> {
        Ok(Subscription::new(
            record.client_id,
            record.filter,
            decode_qos(record.qos)?,
            record.clean_session,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos2_key_format() {
        assert_eq!(Qos2Key::new("client-1", 7).as_str(), "client-1:7");

        let event = PublishEvent::new("a", QoS::ExactlyOnce, "x", false, "c", 42);
        assert_eq!(event.qos2_key().to_string(), "c:42");
    }

    #[test]
    fn test_invalid_qos_is_corruption() {
        let record = PublishRecord {
            topic: "a".into(),
            qos: 7,
            payload: vec![],
            retain: false,
            client_id: "c".into(),
            packet_id: 1,
        };
        let err = PublishEvent::try_from(record).unwrap_err();
        assert!(matches!(err, PersistenceError::Corruption(_)));
    }

    #[test]
    fn test_subscription_record_keeps_flags() {
        let sub = Subscription::new("c", "a/+", QoS::AtLeastOnce, true);
        let restored = Subscription::try_from(SubscriptionRecord::from(&sub)).unwrap();
        assert_eq!(restored.qos, QoS::AtLeastOnce);
        assert!(restored.clean_session);
        assert_eq!(&*restored.filter, "a/+");
    }
}
