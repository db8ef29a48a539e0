//! Session and endpoint configuration.
//!
//! DESIGN
//! ======
//! Everything the SDK needs is passed in explicitly: `SessionConfig` to
//! `Session::open`, `ApiConfig` to the RTM and Web clients. Defaults live in
//! `DEFAULT_*` constants; `from_env` overlays environment variables on top
//! of them. Unparseable numeric overrides fall back to the default.

use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_API_HOST: &str = "api.livechatinc.com";
pub const DEFAULT_API_VERSION: &str = "3.5";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_PUSH_BUFFER_CAPACITY: usize = 1024;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("invalid boolean for {var}: {value}")]
    InvalidBool { var: &'static str, value: String },
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

// =============================================================================
// CLIENT KIND / TARGET
// =============================================================================

/// Which side of the API a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Agent,
    Customer,
}

impl ClientKind {
    /// Path segment used in endpoint URLs.
    #[must_use]
    pub fn as_path(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Customer => "customer",
        }
    }
}

/// Account a customer client connects to. Agents are identified by their
/// token alone and carry no target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerTarget {
    License(u64),
    Organization(String),
}

impl CustomerTarget {
    fn query_pair(&self) -> (&'static str, String) {
        match self {
            Self::License(id) => ("license_id", id.to_string()),
            Self::Organization(id) => ("organization_id", id.clone()),
        }
    }
}

// =============================================================================
// API CONFIG
// =============================================================================

/// Endpoint selection: host, API version, and scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Host, optionally with port (e.g. `"api.livechatinc.com"`).
    pub host: String,
    /// API version without the leading `v` (e.g. `"3.5"`).
    pub version: String,
    /// `wss`/`https` when true, `ws`/`http` otherwise.
    pub tls: bool,
    /// Whole-request timeout for Web API calls.
    pub http_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_API_HOST.to_owned(),
            version: DEFAULT_API_VERSION.to_owned(),
            tls: true,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Build endpoint config from environment variables.
    ///
    /// Optional:
    /// - `API_HOST`: default `api.livechatinc.com`
    /// - `API_VERSION`: default `3.5`
    /// - `API_TLS`: `true` (default) or `false`
    /// - `API_HTTP_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBool`] for an unrecognized `API_TLS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_owned());
        let version = std::env::var("API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_owned())
            .trim_start_matches('v')
            .to_owned();
        let tls = env_bool("API_TLS", true)?;
        let http_timeout = Duration::from_secs(env_parse("API_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS));
        Ok(Self { host, version, tls, http_timeout })
    }

    /// `wss://<host>/v<version>/<kind>/rtm/ws[?license_id=..|organization_id=..]`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the host does not form a valid URL.
    pub fn rtm_url(&self, kind: ClientKind, target: Option<&CustomerTarget>) -> Result<String, ConfigError> {
        let scheme = if self.tls { "wss" } else { "ws" };
        self.build_url(scheme, &format!("{}/rtm/ws", kind.as_path()), target)
    }

    /// `https://<host>/v<version>/<kind>/action/<action>[?license_id=..|organization_id=..]`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the host does not form a valid URL.
    pub fn action_url(
        &self,
        kind: ClientKind,
        action: &str,
        target: Option<&CustomerTarget>,
    ) -> Result<String, ConfigError> {
        let scheme = if self.tls { "https" } else { "http" };
        self.build_url(scheme, &format!("{}/action/{action}", kind.as_path()), target)
    }

    fn build_url(&self, scheme: &str, path: &str, target: Option<&CustomerTarget>) -> Result<String, ConfigError> {
        let raw = format!("{scheme}://{}/v{}/{path}", self.host.trim_end_matches('/'), self.version);
        let mut url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))?;
        if let Some(target) = target {
            let (key, value) = target.query_pair();
            url.query_pairs_mut().append_pair(key, &value);
        }
        Ok(url.into())
    }
}

// =============================================================================
// SESSION CONFIG
// =============================================================================

/// Tuning knobs for one RTM session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// `Origin` header sent with the WebSocket handshake.
    pub origin: Option<String>,
    /// Time between keep-alive pings.
    pub ping_interval: Duration,
    /// Upper bound on a single ping write.
    pub ping_timeout: Duration,
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// How long `send` waits for the correlated response.
    pub response_timeout: Duration,
    /// Whether to run the keep-alive loop at all.
    pub keep_alive: bool,
    /// Pushes retained before the oldest is evicted.
    pub push_buffer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            origin: None,
            ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
            ping_timeout: Duration::from_millis(DEFAULT_PING_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            keep_alive: true,
            push_buffer_capacity: DEFAULT_PUSH_BUFFER_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Build session config from environment variables.
    ///
    /// Optional:
    /// - `RTM_ORIGIN`
    /// - `RTM_PING_INTERVAL_MS`: default 5000
    /// - `RTM_PING_TIMEOUT_MS`: default 3000
    /// - `RTM_CONNECT_TIMEOUT_MS`: default 10000
    /// - `RTM_RESPONSE_TIMEOUT_MS`: default 3000
    /// - `RTM_KEEP_ALIVE`: `true` (default) or `false`
    /// - `RTM_PUSH_BUFFER_CAPACITY`: default 1024
    ///
    /// # Errors
    ///
    /// Returns an error for an unrecognized `RTM_KEEP_ALIVE` or a zero value
    /// that would make the session unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            origin: std::env::var("RTM_ORIGIN").ok().filter(|s| !s.is_empty()),
            ping_interval: Duration::from_millis(env_parse("RTM_PING_INTERVAL_MS", DEFAULT_PING_INTERVAL_MS)),
            ping_timeout: Duration::from_millis(env_parse("RTM_PING_TIMEOUT_MS", DEFAULT_PING_TIMEOUT_MS)),
            connect_timeout: Duration::from_millis(env_parse("RTM_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)),
            response_timeout: Duration::from_millis(env_parse("RTM_RESPONSE_TIMEOUT_MS", DEFAULT_RESPONSE_TIMEOUT_MS)),
            keep_alive: env_bool("RTM_KEEP_ALIVE", true)?,
            push_buffer_capacity: env_parse("RTM_PUSH_BUFFER_CAPACITY", DEFAULT_PUSH_BUFFER_CAPACITY),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would panic a timer or make every call fail.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive && self.ping_interval.is_zero() {
            return Err(ConfigError::Zero { field: "ping_interval" });
        }
        if self.keep_alive && self.ping_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "ping_timeout" });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "connect_timeout" });
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "response_timeout" });
        }
        if self.push_buffer_capacity == 0 {
            return Err(ConfigError::Zero { field: "push_buffer_capacity" });
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
