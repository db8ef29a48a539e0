//! RTM session SDK.
//!
//! One persistent WebSocket per logical client multiplexes correlated
//! request/response pairs and unsolicited pushes, with per-request timeouts
//! and a keep-alive loop. The Web caller covers the same actions over plain
//! HTTPS.
//!
//! MODULES
//! =======
//! - `transport`: duplex text-frame connection (`Connector`, WebSocket impl)
//! - `correlation`: outstanding request id → one-shot waiter
//! - `push`: bounded buffer of unsolicited messages
//! - `dispatcher`: sole reader, routes each frame
//! - `keepalive`: periodic ping loop
//! - `session`: `open` / `send` / `close`
//! - `client`: agent and customer RTM clients
//! - `web`: per-action HTTPS caller
//! - `config`, `error`

pub mod client;
pub mod config;
pub mod correlation;
mod dispatcher;
pub mod error;
pub mod keepalive;
pub mod push;
pub mod session;
pub mod transport;
pub mod web;

pub use client::RtmClient;
pub use config::{ApiConfig, ClientKind, ConfigError, CustomerTarget, SessionConfig};
pub use error::{ConnectionError, SendError, TransportError};
pub use frames::{Inbound, Message, Request, Response};
pub use keepalive::KeepAliveState;
pub use session::Session;
pub use transport::{Connection, Connector, FrameSink, FrameSource, WsConnector};
pub use web::{WebClient, WebError, WebResponse};
