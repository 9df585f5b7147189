//! Subscription registry errors.

use std::fmt;

use crate::error::ErrorKind;
use crate::persistence::PersistenceError;

/// Errors returned by `SubscriptionRegistry` mutations
#[derive(Debug)]
pub enum SubscriptionError {
    /// Filter failed validation
    InvalidFilter { filter: String, reason: &'static str },
    /// A subscription handed to `update` belongs to another client
    ClientMismatch { expected: String, found: String },
    /// The subscription store rejected the write
    Persistence(PersistenceError),
}

impl SubscriptionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            Self::ClientMismatch { .. } => ErrorKind::PreconditionViolation,
            Self::Persistence(e) => e.kind(),
        }
    }
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter { filter, reason } => {
                write!(f, "invalid topic filter '{}': {}", filter, reason)
            }
            Self::ClientMismatch { expected, found } => write!(
                f,
                "subscription of client '{}' passed for client '{}'",
                found, expected
            ),
            Self::Persistence(e) => write!(f, "subscription store error: {}", e),
        }
    }
}

impl std::error::Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceError> for SubscriptionError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}
