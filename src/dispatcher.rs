//! Inbound dispatcher: the single reader of the transport.
//!
//! LIFECYCLE
//! =========
//! 1. `recv` a text frame from the source
//! 2. decode once into `Inbound`
//! 3. route: resolve a waiting `send`, buffer a push, or discard a control ack
//! 4. on read failure or end of stream: fail every outstanding request with
//!    `ConnectionClosed`, close the push buffer, exit
//!
//! Routing never awaits a caller, so a slow consumer cannot stall delivery.

use std::sync::Arc;

use frames::{Inbound, Message};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::correlation::CorrelationTable;
use crate::error::{SendError, TransportError};
use crate::push::PushBuffer;
use crate::transport::FrameSource;

/// Where one inbound frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Resolved an outstanding `send`.
    Delivered,
    /// Appended to the push buffer.
    Buffered,
    /// Ping/pong acknowledgement, dropped.
    Discarded,
    /// Undecodable frame, dropped.
    Malformed,
}

/// Why the dispatcher loop stopped.
#[derive(Debug)]
pub(crate) enum DispatchExit {
    Shutdown,
    PeerClosed,
    ReadFailed(TransportError),
}

/// Classify and route one inbound frame.
pub(crate) fn route_frame(text: &str, table: &CorrelationTable, pushes: &PushBuffer) -> Route {
    let inbound = match frames::decode_inbound(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, len = text.len(), "rtm: dropping malformed frame");
            return Route::Malformed;
        }
    };

    match inbound {
        Inbound::Response(response) => {
            let request_id = response.request_id.clone();
            let action = response.action.clone();
            // Unmatched responses fall through to the push buffer.
            let Err(unmatched) = table.resolve(&request_id, response) else {
                debug!(%request_id, %action, "rtm: response delivered");
                return Route::Delivered;
            };
            if frames::is_control_action(&unmatched.action) {
                return Route::Discarded;
            }
            debug!(%request_id, %action, "rtm: unmatched response buffered as push");
            pushes.push(Message::from(unmatched));
            Route::Buffered
        }
        Inbound::Push(message) => {
            debug!(action = %message.action, "rtm: push received");
            pushes.push(message);
            Route::Buffered
        }
        Inbound::Control(_) => Route::Discarded,
    }
}

/// Spawn the dispatcher loop. It owns `source` until it exits.
pub(crate) fn spawn_dispatcher(
    mut source: Box<dyn FrameSource>,
    table: CorrelationTable,
    pushes: Arc<PushBuffer>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<DispatchExit> {
    tokio::spawn(async move {
        let exit = loop {
            if *shutdown.borrow() {
                break DispatchExit::Shutdown;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break DispatchExit::Shutdown;
                    }
                }
                frame = source.recv() => match frame {
                    Some(Ok(text)) => {
                        route_frame(&text, &table, &pushes);
                    }
                    Some(Err(e)) => break DispatchExit::ReadFailed(e),
                    None => break DispatchExit::PeerClosed,
                },
            }
        };

        let failed = table.fail_all(&SendError::ConnectionClosed);
        pushes.close();
        match &exit {
            DispatchExit::Shutdown => debug!(failed, "rtm: dispatcher stopped"),
            DispatchExit::PeerClosed => info!(failed, "rtm: connection closed by peer"),
            DispatchExit::ReadFailed(e) => warn!(error = %e, failed, "rtm: connection read failed"),
        }
        exit
    })
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
