//! The lifecycle gate shared by every I/O resource.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sync::spin::SpinMutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Closed,
    Opening,
    Open,
    Closing,
}

struct Inner {
    lifecycle: Lifecycle,
    close_initiated: bool,
    failure: Option<Arc<Error>>,
}

/// Tracks a resource along `Closed → Opening → Open → Closing → Closed`,
/// with a one-shot failure slot.
///
/// Transitions are monotone. `set_opening` and `set_closing` report whether
/// the caller is the one that initiated the transition, which is how
/// concurrent `open`/`close` calls serialize:
///
/// ```ignore
/// pub async fn close(&self) {
///     if !self.open_state.set_closing() {
///         return;
///     }
///     // release the transport, wake pending waiters
///     self.open_state.set_closed();
/// }
/// ```
pub struct OpenState {
    inner: SpinMutex<Inner>,
}

impl OpenState {
    /// A fresh, never-opened state.
    pub fn new() -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                lifecycle: Lifecycle::Closed,
                close_initiated: false,
                failure: None,
            }),
        }
    }

    /// A state that starts out open, for resources born connected (accepted
    /// sockets, pipe ends).
    pub fn open() -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                lifecycle: Lifecycle::Open,
                close_initiated: false,
                failure: None,
            }),
        }
    }

    /// Begins opening. Returns whether the caller is the first opener.
    pub fn set_opening(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Closed && !inner.close_initiated {
            inner.lifecycle = Lifecycle::Opening;
            true
        } else {
            false
        }
    }

    /// Marks the resource open. Ignored once closing has begun.
    pub fn set_open(&self) {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Opening {
            inner.lifecycle = Lifecycle::Open;
        }
    }

    /// Records why opening failed; `ensure_open` reports it from then on.
    /// Only the first failure is kept.
    pub fn set_open_failure(&self, failure: Error) {
        let mut inner = self.inner.lock();
        if inner.failure.is_none() {
            inner.failure = Some(Arc::new(failure));
        }
    }

    /// Begins closing. Returns whether the caller is the first to close;
    /// exactly one caller ever sees `true`.
    pub fn set_closing(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.close_initiated {
            false
        } else {
            inner.close_initiated = true;
            inner.lifecycle = Lifecycle::Closing;
            true
        }
    }

    /// Marks the close complete. Terminal.
    pub fn set_closed(&self) {
        let mut inner = self.inner.lock();
        inner.close_initiated = true;
        inner.lifecycle = Lifecycle::Closed;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Open
    }

    pub fn is_closing(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Closing
    }

    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock();
        inner.lifecycle == Lifecycle::Closed && inner.close_initiated
    }

    /// Fails with [`Error::NotOpen`] unless the resource is open, carrying
    /// the recorded open failure if there is one.
    pub fn ensure_open(&self) -> Result<()> {
        let inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Open {
            Ok(())
        } else {
            Err(Error::NotOpen(inner.failure.clone()))
        }
    }

    /// The recorded open failure, if any.
    pub fn failure(&self) -> Option<Arc<Error>> {
        self.inner.lock().failure.clone()
    }
}

impl Default for OpenState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::OpenState;
    use crate::error::Error;

    #[test]
    fn transitions_are_monotone() {
        let state = OpenState::new();
        assert!(!state.is_open());
        assert!(state.set_opening());
        assert!(!state.set_opening());
        state.set_open();
        assert!(state.is_open());
        assert!(state.ensure_open().is_ok());
        assert!(state.set_closing());
        assert!(!state.is_open());
        state.set_closed();
        assert!(state.is_closed());
        assert!(!state.set_opening());
    }

    #[test]
    fn set_closing_returns_true_exactly_once() {
        let state = OpenState::open();
        let first = state.set_closing();
        let second = state.set_closing();
        assert!(first);
        assert!(!second);
        state.set_closed();
        assert!(!state.set_closing());
    }

    #[test]
    fn ensure_open_carries_the_failure() {
        let state = OpenState::new();
        state.set_opening();
        state.set_open_failure(Error::EndOfFile);
        state.set_closed();
        match state.ensure_open() {
            Err(Error::NotOpen(Some(cause))) => assert!(cause.is_end_of_file()),
            other => panic!("expected NotOpen with cause, got {other:?}"),
        }
    }
}
