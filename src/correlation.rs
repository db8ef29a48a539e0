//! Correlation table: outstanding request id → single-use waiter.
//!
//! DESIGN
//! ======
//! Each `send` registers a one-shot channel under its request id. The
//! dispatcher resolves it when the matching response arrives; timeouts and
//! failed writes remove it. Removal happens under the lock, so an entry can
//! be resolved at most once and a second resolver sees a no-op.
//!
//! The table also carries the session's open/closed flag: `fail_all` drains
//! every entry and closes the table in one critical section, so a `send`
//! racing a shutdown either registers before the drain (and is failed by it)
//! or is rejected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::Response;
use tokio::sync::oneshot;

use crate::error::SendError;

/// What a waiter eventually receives.
pub type Resolution = Result<Response, SendError>;

/// Receiving half handed to the issuing `send` call.
pub type Waiter = oneshot::Receiver<Resolution>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("request id {0} is already outstanding")]
    Duplicate(String),
    #[error("correlation table is closed")]
    Closed,
}

#[derive(Clone, Default)]
pub struct CorrelationTable {
    inner: Arc<Mutex<TableInner>>,
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<String, oneshot::Sender<Resolution>>,
    closed: bool,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `request_id`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Duplicate`] if the id is already outstanding,
    /// [`RegisterError::Closed`] after [`Self::fail_all`].
    pub fn register(&self, request_id: &str) -> Result<Waiter, RegisterError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RegisterError::Closed);
        }
        if inner.entries.contains_key(request_id) {
            return Err(RegisterError::Duplicate(request_id.to_owned()));
        }
        let (tx, rx) = oneshot::channel();
        inner.entries.insert(request_id.to_owned(), tx);
        Ok(rx)
    }

    /// Deliver a response to its waiter and remove the entry.
    ///
    /// # Errors
    ///
    /// Hands the response back when no entry exists (late or duplicate
    /// response) or the waiter has already gone away.
    pub fn resolve(&self, request_id: &str, response: Response) -> Result<(), Response> {
        let Some(tx) = self.lock().entries.remove(request_id) else {
            return Err(response);
        };
        match tx.send(Ok(response)) {
            Ok(()) => Ok(()),
            Err(Ok(response)) => Err(response),
            // Unreachable in practice: only `Ok` is sent above.
            Err(Err(_)) => Ok(()),
        }
    }

    /// Drop an entry without resolving it. Returns whether it existed.
    pub fn remove(&self, request_id: &str) -> bool {
        self.lock().entries.remove(request_id).is_some()
    }

    /// Resolve every outstanding entry with `error` and close the table.
    /// Returns how many entries were failed.
    pub fn fail_all(&self, error: &SendError) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.entries.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.lock().entries.contains_key(request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`Self::fail_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
#[path = "correlation_test.rs"]
mod tests;
