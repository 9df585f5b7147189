//! Error classification shared by the registry and the store.
//!
//! Each module keeps its own error enum; `ErrorKind` lets the broker's
//! network layer decide how to react without matching on every variant.

use std::fmt;

/// Broad category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A keyed lookup found nothing
    NotFound,
    /// Backing storage could not be opened, read or written
    StoreUnavailable,
    /// A subscription filter is structurally invalid
    InvalidFilter,
    /// A topic name is invalid where an exact topic is required
    InvalidTopic,
    /// A keyed write would replace a different existing value
    Conflict,
    /// The store was used before `init_store` or after `close`,
    /// or arguments disagree with each other
    PreconditionViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::StoreUnavailable => "store unavailable",
            Self::InvalidFilter => "invalid topic filter",
            Self::InvalidTopic => "invalid topic name",
            Self::Conflict => "conflict",
            Self::PreconditionViolation => "precondition violation",
        };
        f.write_str(name)
    }
}
