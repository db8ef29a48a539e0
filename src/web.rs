//! Web API caller: one `POST` per action.
//!
//! DESIGN
//! ======
//! A single request builder serves every action: the URL is derived from
//! client kind, API version and action name, the body is the JSON payload,
//! and the access token travels in `Authorization` exactly as given
//! (`"Bearer <token>"` or `"Basic <credentials>"`). Non-2xx replies are not
//! errors here; the caller inspects `status` and the error body.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::{ApiConfig, ClientKind, ConfigError, CustomerTarget};

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid authorization header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Status and decoded body of one Web API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebResponse {
    pub status: u16,
    /// JSON body; a non-JSON body is kept as a string, an empty one as null.
    pub body: Value,
}

impl WebResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct WebClient {
    kind: ClientKind,
    api: ApiConfig,
    target: Option<CustomerTarget>,
    http: reqwest::Client,
}

impl WebClient {
    /// # Errors
    ///
    /// [`WebError::InvalidHeader`] if `access_token` is not a valid header
    /// value, [`WebError::Http`] if the HTTP client cannot be built.
    pub fn new(kind: ClientKind, api: ApiConfig, access_token: &str) -> Result<Self, WebError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(access_token)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(api.http_timeout)
            .build()?;
        Ok(Self { kind, api, target: None, http })
    }

    /// Address a specific license or organization (customer calls).
    #[must_use]
    pub fn with_target(mut self, target: CustomerTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the endpoint cannot be built.
    pub fn action_url(&self, action: &str) -> Result<String, ConfigError> {
        self.api.action_url(self.kind, action, self.target.as_ref())
    }

    /// `POST` `payload` to the action endpoint.
    ///
    /// # Errors
    ///
    /// [`WebError::Http`] on connect, timeout or body read failure;
    /// [`WebError::Config`] if the endpoint cannot be built.
    pub async fn call(&self, action: &str, payload: Value) -> Result<WebResponse, WebError> {
        let url = self.action_url(action)?;
        let payload = if payload.is_null() { Value::Object(Map::new()) } else { payload };

        info!(kind = self.kind.as_path(), %action, "web: call");
        let response = self.http.post(&url).json(&payload).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(%action, status, len = text.len(), "web: response");

        Ok(WebResponse { status, body: parse_body(&text) })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
#[path = "web_test.rs"]
mod tests;
