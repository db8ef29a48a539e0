//! Keep-alive: periodic `ping` control frames on an open session.
//!
//! LIFECYCLE
//! =========
//! Idle → Running on spawn, Running → Stopped when the loop exits. Exit
//! reasons: shutdown signal, session closed, a failed ping write, or a ping
//! write that outlives `ping_timeout`. A failed ping only stops the loop; the
//! dispatcher notices a dead connection on its own read side.
//!
//! Pings carry no `request_id` and are never registered for correlation.

use std::time::Duration;

use frames::Request;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, warn};

use crate::correlation::CorrelationTable;
use crate::error::TransportError;
use crate::transport::{SharedSink, write_frame};

/// Observable state of a session's keep-alive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveState {
    /// Not started (or disabled in config).
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
pub(crate) enum KeepAliveExit {
    Shutdown,
    SessionClosed,
    PingFailed(TransportError),
    PingTimedOut,
}

/// Spawn the ping loop. The first ping goes out one `interval` after spawn.
pub(crate) fn spawn_keep_alive(
    sink: SharedSink,
    table: CorrelationTable,
    interval: Duration,
    ping_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
    state: watch::Sender<KeepAliveState>,
) -> JoinHandle<KeepAliveExit> {
    state.send_replace(KeepAliveState::Running);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break KeepAliveExit::Shutdown;
                    }
                }
                _ = ticker.tick() => {
                    if table.is_closed() {
                        break KeepAliveExit::SessionClosed;
                    }
                    let frame = match frames::encode_control(&Request::ping()) {
                        Ok(frame) => frame,
                        Err(e) => break KeepAliveExit::PingFailed(TransportError::Other(e.to_string())),
                    };
                    match timeout(ping_timeout, write_frame(&sink, frame)).await {
                        Ok(Ok(())) => debug!("rtm: ping sent"),
                        Ok(Err(e)) => break KeepAliveExit::PingFailed(e),
                        Err(_) => break KeepAliveExit::PingTimedOut,
                    }
                }
            }
        };

        match &exit {
            KeepAliveExit::Shutdown | KeepAliveExit::SessionClosed => debug!("rtm: keep-alive stopped"),
            KeepAliveExit::PingFailed(e) => warn!(error = %e, "rtm: ping failed; keep-alive stopped"),
            KeepAliveExit::PingTimedOut => {
                warn!(timeout_ms = ping_timeout.as_millis(), "rtm: ping write timed out; keep-alive stopped");
            }
        }
        state.send_replace(KeepAliveState::Stopped);
        exit
    })
}

#[cfg(test)]
#[path = "keepalive_test.rs"]
mod tests;
