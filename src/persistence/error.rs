//! Persistence error types.

use std::fmt;

use crate::error::ErrorKind;

/// Errors that can occur during persistence operations.
#[derive(Debug)]
pub enum PersistenceError {
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialize(String),
    /// Deserialization error
    Deserialize(String),
    /// Storage backend error
    Storage(String),
    /// Data corruption detected
    Corruption(String),
    /// No value stored under the key
    NotFound(String),
    /// A different value is already stored under the key
    Conflict(String),
    /// Topic is not a valid exact topic name
    InvalidTopic { topic: String, reason: &'static str },
    /// Store used before `init_store`
    NotInitialized,
    /// Store used after `close`
    Closed,
}

impl PersistenceError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Serialize(_)
            | Self::Deserialize(_)
            | Self::Storage(_)
            | Self::Corruption(_) => ErrorKind::StoreUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidTopic { .. } => ErrorKind::InvalidTopic,
            Self::NotInitialized | Self::Closed => ErrorKind::PreconditionViolation,
        }
    }

    /// Returns true for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Serialize(e) => write!(f, "serialization error: {}", e),
            Self::Deserialize(e) => write!(f, "deserialization error: {}", e),
            Self::Storage(e) => write!(f, "storage error: {}", e),
            Self::Corruption(e) => write!(f, "data corruption: {}", e),
            Self::NotFound(key) => write!(f, "no entry for key '{}'", key),
            Self::Conflict(key) => write!(f, "a different entry already exists for key '{}'", key),
            Self::InvalidTopic { topic, reason } => {
                write!(f, "invalid topic '{}': {}", topic, reason)
            }
            Self::NotInitialized => write!(f, "store used before init_store"),
            Self::Closed => write!(f, "store used after close"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<fjall::Error> for PersistenceError {
    fn from(err: fjall::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for PersistenceError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for PersistenceError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Deserialize(err.to_string())
    }
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
