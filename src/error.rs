//! Error taxonomy for the RTM session.
//!
//! Errors tied to one request (`ResponseTimeout`, a failed write) come back
//! from that `send` call only. Connection-wide failures reach every
//! outstanding request as `ConnectionClosed`.

use std::time::Duration;

use crate::config::ConfigError;

/// Failure reported by a [`crate::transport::FrameSink`] or
/// [`crate::transport::FrameSource`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is no longer open.
    #[error("connection closed")]
    Closed,
    /// The underlying WebSocket reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    /// Any other transport failure.
    #[error("transport failed: {0}")]
    Other(String),
}

/// The session could not be established.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The handshake did not complete within `connect_timeout`.
    #[error("timed out connecting after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },
    /// DNS, TLS, refused connection, or a rejected handshake.
    #[error("connect failed: {0}")]
    Transport(#[from] TransportError),
    /// The configured `Origin` is not a valid header value.
    #[error("invalid origin header: {0}")]
    InvalidOrigin(String),
    /// The session config would make the session unusable.
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a `send` call that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No session has been opened.
    #[error("not connected")]
    NotConnected,
    /// The write failed, or the connection closed while awaiting a response.
    #[error("connection closed")]
    ConnectionClosed,
    /// No matching response arrived in time.
    #[error("no response to request {request_id} within {}ms", timeout.as_millis())]
    ResponseTimeout { request_id: String, timeout: Duration },
    /// The request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(String),
}
