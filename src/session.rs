//! RTM session: one persistent connection multiplexing requests and pushes.
//!
//! DESIGN
//! ======
//! `open` establishes the transport and spawns two tasks scoped to the
//! session: the dispatcher (sole reader) and, when enabled, the keep-alive
//! loop. `send` tags each request with a fresh random id, registers a
//! one-shot waiter, writes the frame through the shared sink, and awaits the
//! waiter. One `response_timeout` deadline bounds the write and the wait, and
//! the write is raced against the shutdown signal so a stalled transport
//! never outlives `close`.
//!
//! LIFECYCLE
//! =========
//! open → (send | next_push)* → close
//!
//! The session is open while its correlation table accepts registrations.
//! `close`, a dispatcher exit, or dropping the session closes the table and
//! fails every outstanding request with `ConnectionClosed`. A closed session
//! is not reusable; open a new one.
//!
//! ERROR HANDLING
//! ==============
//! Each `send` resolves exactly once: its response, `ResponseTimeout`, or
//! `ConnectionClosed`. Its correlation entry is gone by the time the call
//! returns or is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use frames::{Message, Request, Response};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::correlation::{CorrelationTable, RegisterError, Waiter};
use crate::dispatcher::{DispatchExit, spawn_dispatcher};
use crate::error::{ConnectionError, SendError};
use crate::keepalive::{KeepAliveExit, KeepAliveState, spawn_keep_alive};
use crate::push::PushBuffer;
use crate::transport::{Connection, Connector, SharedSink, WsConnector, write_frame};

/// Largest request id drawn for an outbound request.
pub const MAX_REQUEST_ID: u64 = 9_999_999_999;

/// Upper bound on sending the WebSocket close frame during `close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Session {
    sink: SharedSink,
    table: CorrelationTable,
    pushes: Arc<PushBuffer>,
    config: SessionConfig,
    shutdown: watch::Sender<bool>,
    keep_alive_state: watch::Receiver<KeepAliveState>,
    tasks: Mutex<Tasks>,
    closing: AtomicBool,
}

struct Tasks {
    dispatcher: Option<JoinHandle<DispatchExit>>,
    keep_alive: Option<JoinHandle<KeepAliveExit>>,
}

impl Session {
    /// Open a session over WebSocket.
    ///
    /// # Errors
    ///
    /// See [`Self::open_with`].
    pub async fn open(url: &str, config: SessionConfig) -> Result<Self, ConnectionError> {
        Self::open_with(&WsConnector, url, config).await
    }

    /// Open a session over any [`Connector`].
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Config`] if `config` fails validation,
    /// [`ConnectionError::Timeout`] if the handshake outlives
    /// `connect_timeout`, or the connector's own error.
    pub async fn open_with<C>(connector: &C, url: &str, config: SessionConfig) -> Result<Self, ConnectionError>
    where
        C: Connector + ?Sized,
    {
        config.validate()?;

        let Connection { sink, source } = timeout(config.connect_timeout, connector.connect(url, config.origin.as_deref()))
            .await
            .map_err(|_| ConnectionError::Timeout { timeout: config.connect_timeout })??;

        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));
        let table = CorrelationTable::new();
        let pushes = Arc::new(PushBuffer::new(config.push_buffer_capacity));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (state_tx, keep_alive_state) = watch::channel(KeepAliveState::Idle);

        let dispatcher = spawn_dispatcher(source, table.clone(), pushes.clone(), shutdown_rx.clone());
        let keep_alive = config.keep_alive.then(|| {
            spawn_keep_alive(sink.clone(), table.clone(), config.ping_interval, config.ping_timeout, shutdown_rx, state_tx)
        });

        info!(%url, keep_alive = config.keep_alive, "rtm: session opened");
        Ok(Self {
            sink,
            table,
            pushes,
            config,
            shutdown,
            keep_alive_state,
            tasks: Mutex::new(Tasks { dispatcher: Some(dispatcher), keep_alive }),
            closing: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Send a request and wait for its correlated response.
    ///
    /// `response_timeout` covers the write and the wait together, and
    /// `close` interrupts either phase.
    ///
    /// # Errors
    ///
    /// - [`SendError::ConnectionClosed`] if the session is closed, the write
    ///   fails, or the connection closes before the response arrives.
    /// - [`SendError::ResponseTimeout`] if no response arrives within
    ///   `response_timeout`, including a write that stalls that long.
    /// - [`SendError::Encode`] if the payload cannot be serialized.
    pub async fn send(&self, request: Request) -> Result<Response, SendError> {
        let started = Instant::now();
        let deadline = started + self.config.response_timeout;
        let (request_id, waiter) = register_fresh(&self.table, || rand::rng().random_range(1..=MAX_REQUEST_ID))?;
        let _pending = PendingGuard { table: &self.table, request_id: &request_id };

        let frame = frames::encode_request(&request, &request_id).map_err(|e| SendError::Encode(e.to_string()))?;
        info!(%request_id, action = %request.action, "rtm: send request");

        let outcome = tokio::select! {
            written = timeout_at(deadline, write_frame(&self.sink, frame)) => match written {
                Ok(Ok(())) => await_response(waiter, &request_id, deadline, self.config.response_timeout).await,
                Ok(Err(e)) => {
                    warn!(%request_id, action = %request.action, error = %e, "rtm: request write failed");
                    Err(SendError::ConnectionClosed)
                }
                Err(_) => Err(self.timed_out(&request_id)),
            },
            () = closed(self.shutdown.subscribe()) => Err(SendError::ConnectionClosed),
        };

        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            Ok(response) => {
                debug!(%request_id, action = %response.action, success = response.success, elapsed_ms, "rtm: response");
            }
            Err(e) => warn!(%request_id, action = %request.action, error = %e, elapsed_ms, "rtm: request failed"),
        }
        outcome
    }

    fn timed_out(&self, request_id: &str) -> SendError {
        SendError::ResponseTimeout { request_id: request_id.to_owned(), timeout: self.config.response_timeout }
    }

    // =========================================================================
    // PUSHES
    // =========================================================================

    /// Wait for the next push. `None` once the session is closed and every
    /// buffered push has been taken.
    pub async fn next_push(&self) -> Option<Message> {
        self.pushes.pop().await
    }

    pub fn try_next_push(&self) -> Option<Message> {
        self.pushes.try_pop()
    }

    pub fn drain_pushes(&self) -> Vec<Message> {
        self.pushes.drain()
    }

    /// Pushes evicted because the buffer was full.
    #[must_use]
    pub fn dropped_pushes(&self) -> u64 {
        self.pushes.dropped()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Close the session. Idempotent.
    ///
    /// Stops both background tasks, fails outstanding requests with
    /// [`SendError::ConnectionClosed`], closes the push buffer, and sends a
    /// close frame to the peer.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let failed = self.table.fail_all(&SendError::ConnectionClosed);
        self.pushes.close();

        let (dispatcher, keep_alive) = {
            let mut tasks = self.lock_tasks();
            (tasks.dispatcher.take(), tasks.keep_alive.take())
        };
        if let Some(handle) = keep_alive {
            let _ = handle.await;
        }
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        match timeout(CLOSE_TIMEOUT, async { self.sink.lock().await.close().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "rtm: transport close failed"),
            Err(_) => warn!(timeout_ms = CLOSE_TIMEOUT.as_millis(), "rtm: transport close timed out"),
        }
        info!(failed, "rtm: session closed");
    }

    /// Whether the session still accepts requests.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.table.is_closed()
    }

    /// Requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn keep_alive_state(&self) -> KeepAliveState {
        *self.keep_alive_state.borrow()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.table.fail_all(&SendError::ConnectionClosed);
        self.pushes.close();
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Register a waiter under a freshly drawn id, redrawing on collision.
fn register_fresh(table: &CorrelationTable, mut draw: impl FnMut() -> u64) -> Result<(String, Waiter), SendError> {
    loop {
        let request_id = draw().to_string();
        match table.register(&request_id) {
            Ok(waiter) => return Ok((request_id, waiter)),
            Err(RegisterError::Duplicate(_)) => debug!(%request_id, "rtm: request id collision; redrawing"),
            Err(RegisterError::Closed) => return Err(SendError::ConnectionClosed),
        }
    }
}

async fn await_response(
    waiter: Waiter,
    request_id: &str,
    deadline: Instant,
    response_timeout: Duration,
) -> Result<Response, SendError> {
    match timeout_at(deadline, waiter).await {
        Ok(Ok(resolution)) => resolution,
        // Sender dropped without resolving: the table was torn down.
        Ok(Err(_)) => Err(SendError::ConnectionClosed),
        Err(_) => Err(SendError::ResponseTimeout { request_id: request_id.to_owned(), timeout: response_timeout }),
    }
}

/// Completes once the session's shutdown flag is raised (or its sender is gone).
async fn closed(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

/// Removes a correlation entry when its `send` returns or is dropped.
struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.request_id);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
