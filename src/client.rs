//! RTM clients: agent and customer wrappers around one [`Session`].
//!
//! The client owns URL construction and the open/close lifecycle. Before the
//! first successful `open` (or after `close`) every `send` fails fast with
//! [`SendError::NotConnected`].

use std::sync::Arc;

use frames::{Message, Request, Response};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{ApiConfig, ClientKind, ConfigError, CustomerTarget, SessionConfig};
use crate::error::{ConnectionError, SendError};
use crate::session::Session;
use crate::transport::{Connector, WsConnector};

pub struct RtmClient {
    kind: ClientKind,
    url: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    session: Mutex<Option<Arc<Session>>>,
}

impl RtmClient {
    /// Agent client for `wss://<host>/v<version>/agent/rtm/ws`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the endpoint cannot be built.
    pub fn agent(api: &ApiConfig, config: SessionConfig) -> Result<Self, ConfigError> {
        let url = api.rtm_url(ClientKind::Agent, None)?;
        Ok(Self::new(ClientKind::Agent, url, config))
    }

    /// Customer client bound to a license or organization.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the endpoint cannot be built.
    pub fn customer(api: &ApiConfig, target: &CustomerTarget, config: SessionConfig) -> Result<Self, ConfigError> {
        let url = api.rtm_url(ClientKind::Customer, Some(target))?;
        Ok(Self::new(ClientKind::Customer, url, config))
    }

    fn new(kind: ClientKind, url: String, config: SessionConfig) -> Self {
        Self { kind, url, config, connector: Arc::new(WsConnector), session: Mutex::new(None) }
    }

    /// Replace the transport used by `open`.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Open the session. A no-op while a session is already open; a closed
    /// session is replaced.
    ///
    /// The handshake runs without holding the session slot, so concurrent
    /// `send` calls keep failing fast with `NotConnected` until it completes.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] from [`Session::open_with`]; the
    /// client stays unopened.
    pub async fn open(&self) -> Result<(), ConnectionError> {
        if self.is_open().await {
            return Ok(());
        }
        let session = Arc::new(Session::open_with(self.connector.as_ref(), &self.url, self.config.clone()).await?);

        let surplus = {
            let mut slot = self.session.lock().await;
            if slot.as_ref().is_some_and(|current| current.is_open()) {
                Some(session)
            } else {
                *slot = Some(session);
                None
            }
        };
        match surplus {
            // A concurrent `open` won the race; keep its session.
            Some(session) => session.close().await,
            None => info!(kind = self.kind.as_path(), "rtm: client opened"),
        }
        Ok(())
    }

    /// Close the session if one is open.
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    pub async fn is_open(&self) -> bool {
        self.session.lock().await.as_ref().is_some_and(|session| session.is_open())
    }

    /// Send `action` with `payload` and wait for the response.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] before `open`, otherwise see
    /// [`Session::send`].
    pub async fn send(&self, action: &str, payload: Value) -> Result<Response, SendError> {
        let session = self.session().await.ok_or(SendError::NotConnected)?;
        session.send(Request::new(action, payload)).await
    }

    /// `login` with an access token (e.g. `"Bearer <token>"`).
    ///
    /// # Errors
    ///
    /// See [`Self::send`]. An invalid token is not an error: it comes back
    /// as a response with `success == false`.
    pub async fn login(&self, token: &str) -> Result<Response, SendError> {
        self.send("login", json!({ "token": token })).await
    }

    /// Next push from the current session; `None` if not open or once the
    /// session has closed and its pushes are drained.
    pub async fn next_push(&self) -> Option<Message> {
        let session = self.session().await?;
        session.next_push().await
    }

    /// The current session, if any.
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().await.clone()
    }

    #[must_use]
    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
