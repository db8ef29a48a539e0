//! Transport: duplex text-frame connection behind the session.
//!
//! DESIGN
//! ======
//! A connection is split into a `FrameSink` (write half) and a `FrameSource`
//! (read half). The session hands the source to its dispatcher, the only
//! reader, and shares the sink behind an async mutex so `send` calls and the
//! keep-alive loop write one frame at a time.
//!
//! `WsConnector` is the production implementation over `tokio-tungstenite`.
//! Tests plug in the in-memory channel transport from `test_helpers`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::{ConnectionError, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` once the peer has closed the stream.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

/// A freshly established connection.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens connections. Implemented by [`WsConnector`] and by test doubles.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, origin: Option<&str>) -> Result<Connection, ConnectionError>;
}

/// Write half shared by every writer of a session.
pub(crate) type SharedSink = Arc<tokio::sync::Mutex<Box<dyn FrameSink>>>;

/// Serialize one write through the shared sink.
pub(crate) async fn write_frame(sink: &SharedSink, text: String) -> Result<(), TransportError> {
    sink.lock().await.send(text).await
}

// =============================================================================
// WEBSOCKET
// =============================================================================

/// Connects over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, origin: Option<&str>) -> Result<Connection, ConnectionError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::WebSocket(Box::new(e)))?;
        if let Some(origin) = origin {
            let value = HeaderValue::from_str(origin).map_err(|_| ConnectionError::InvalidOrigin(origin.to_owned()))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::WebSocket(Box::new(e)))?;
        debug!(status = %response.status(), "rtm: websocket handshake complete");

        let (write, read) = stream.split();
        Ok(Connection { sink: Box::new(WsSink { inner: write }), source: Box::new(WsSource { inner: read }) })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::WebSocket(Box::new(e)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::WebSocket(Box::new(e)))
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "rtm: peer sent close frame");
                    return None;
                }
                // Control frames are answered by tungstenite itself.
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::WebSocket(Box::new(e)))),
            }
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
