//! Open/close gate shared by the backends.
//!
//! Every data operation holds a shared guard for its whole duration, so
//! `close` (which takes the gate exclusively) waits for in-flight operations
//! before flushing. Operations on an unopened or closed store fail fast.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use super::error::{PersistenceError, Result};

enum State<T> {
    Created,
    Open(T),
    Closed,
}

pub(crate) struct Lifecycle<T> {
    state: RwLock<State<T>>,
}

impl<T> Lifecycle<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Created),
        }
    }

    /// A gate that starts open around `inner`
    pub fn opened(inner: T) -> Self {
        Self {
            state: RwLock::new(State::Open(inner)),
        }
    }

    /// Enter a data operation. The guard must not be held across an await.
    pub fn enter(&self) -> Result<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.state.read(), |state| match state {
            State::Open(inner) => Some(inner),
            _ => None,
        })
        .map_err(|guard| match *guard {
            State::Created => PersistenceError::NotInitialized,
            _ => PersistenceError::Closed,
        })
    }

    /// Open with `open` unless already open. Returns true if this call opened it.
    pub fn open_with<F>(&self, open: F) -> Result<bool>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut state = self.state.write();
        if matches!(*state, State::Open(_)) {
            return Ok(false);
        }
        *state = State::Open(open()?);
        Ok(true)
    }

    /// Close after `finish` succeeds on the open value.
    ///
    /// Waits for in-flight operations. If `finish` fails the store stays open
    /// so the caller can retry. Closing a closed store is a no-op.
    pub fn close_with<F>(&self, finish: F) -> Result<bool>
    where
        F: FnOnce(&T) -> Result<()>,
    {
        let mut state = self.state.write();
        match &*state {
            State::Created => Err(PersistenceError::NotInitialized),
            State::Closed => Ok(false),
            State::Open(inner) => {
                finish(inner)?;
                *state = State::Closed;
                Ok(true)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), State::Open(_))
    }
}
