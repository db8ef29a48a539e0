//! Push buffer: bounded FIFO of unsolicited server messages.
//!
//! DESIGN
//! ======
//! The dispatcher appends every message that is not a correlated response;
//! callers drain it with `pop` / `try_pop` / `drain`. The queue holds at most
//! `capacity` messages. When full, the oldest message is evicted so that the
//! newest state always survives, and the eviction is counted and logged.
//! After `close`, consumers still drain what is queued and then see `None`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use frames::Message;
use tokio::sync::Notify;
use tracing::warn;

pub struct PushBuffer {
    inner: Mutex<PushInner>,
    notify: Notify,
    capacity: usize,
}

struct PushInner {
    queue: VecDeque<Message>,
    dropped: u64,
    closed: bool,
}

impl PushBuffer {
    /// Create a buffer holding at most `capacity` (minimum 1) messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(PushInner { queue: VecDeque::with_capacity(capacity.min(64)), dropped: 0, closed: false }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PushInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a push, evicting the oldest one when full. Ignored after close.
    pub fn push(&self, message: Message) {
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            if inner.queue.len() >= self.capacity {
                if let Some(evicted) = inner.queue.pop_front() {
                    inner.dropped += 1;
                    warn!(
                        action = %evicted.action,
                        capacity = self.capacity,
                        dropped = inner.dropped,
                        "rtm: push buffer full; dropping oldest push"
                    );
                }
            }
            inner.queue.push_back(message);
        }
        self.notify.notify_one();
    }

    /// Pop the oldest push without waiting.
    pub fn try_pop(&self) -> Option<Message> {
        self.lock().queue.pop_front()
    }

    /// Wait for the next push. Returns `None` once closed and empty.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(message) = inner.queue.pop_front() {
                    return Some(message);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<Message> {
        self.lock().queue.drain(..).collect()
    }

    /// Stop accepting pushes and wake every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes evicted because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
#[path = "push_test.rs"]
mod tests;
