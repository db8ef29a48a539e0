//! Shared message model and JSON codec for the RTM WebSocket protocol.
//!
//! Outbound frames are `{action, payload, request_id}` objects; the
//! `request_id` is injected by the session, never by the caller. Inbound
//! frames are decoded once into an [`Inbound`] variant so no consumer has to
//! re-inspect the raw `type` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `type` discriminator carried by responses to client requests.
pub const RESPONSE_TYPE: &str = "response";

/// Action name used by keep-alive pings.
pub const PING_ACTION: &str = "ping";

/// Action name some servers use to acknowledge pings.
pub const PONG_ACTION: &str = "pong";

/// Error returned by [`decode_inbound`] and the encoders.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame text is not a JSON object of the expected shape.
    #[error("failed to decode JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// An application request: an action name plus its payload object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Opaque action name, e.g. `"login"`.
    pub action: String,
    /// Action arguments. Always a JSON object on the wire.
    pub payload: Value,
}

impl Request {
    /// Build a request. A `null` payload is normalized to `{}`.
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        let payload = if payload.is_null() { Value::Object(Map::new()) } else { payload };
        Self { action: action.into(), payload }
    }

    /// The keep-alive control request: `{"action": "ping", "payload": {}}`.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(PING_ACTION, Value::Null)
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    action: &'a str,
    payload: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

/// Encode a request with the session-assigned `request_id`.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_request(request: &Request, request_id: &str) -> Result<String, CodecError> {
    let wire = WireRequest { action: &request.action, payload: &request.payload, request_id: Some(request_id) };
    Ok(serde_json::to_string(&wire)?)
}

/// Encode a fire-and-forget control request (no `request_id`).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_control(request: &Request) -> Result<String, CodecError> {
    let wire = WireRequest { action: &request.action, payload: &request.payload, request_id: None };
    Ok(serde_json::to_string(&wire)?)
}

// =============================================================================
// INBOUND
// =============================================================================

/// A server response correlated to a client request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identifier echoed from the originating request.
    pub request_id: String,
    /// Action the response answers.
    pub action: String,
    /// Message discriminator; always `"response"` for decoded responses.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the server accepted the request.
    pub success: bool,
    /// Response body, or an `{"error": ...}` object when `success` is false.
    pub payload: Value,
}

/// Any inbound message not delivered as a [`Response`]: server pushes,
/// control acknowledgements, and responses nobody is waiting for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub action: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub payload: Value,
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self {
            request_id: Some(response.request_id),
            action: response.action,
            kind: Some(response.kind),
            success: Some(response.success),
            payload: response.payload,
        }
    }
}

/// Classification of an inbound frame, decided once at decode time.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// `type == "response"` with a `request_id`. Whether someone is still
    /// waiting for it is decided by the dispatcher.
    Response(Response),
    /// Unsolicited server event.
    Push(Message),
    /// Ping/pong acknowledgement without a correlatable `request_id`.
    Control(Message),
}

/// Whether an action name is a keep-alive control action.
#[must_use]
pub fn is_control_action(action: &str) -> bool {
    action == PING_ACTION || action == PONG_ACTION
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default, deserialize_with = "lenient_request_id")]
    request_id: Option<String>,
    #[serde(default)]
    action: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    payload: Value,
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON or non-object frames.
pub fn decode_inbound(text: &str) -> Result<Inbound, CodecError> {
    let wire: WireMessage = serde_json::from_str(text)?;
    let payload = if wire.payload.is_null() { Value::Object(Map::new()) } else { wire.payload };

    if wire.kind.as_deref() == Some(RESPONSE_TYPE) {
        if let Some(request_id) = wire.request_id {
            return Ok(Inbound::Response(Response {
                request_id,
                action: wire.action,
                kind: RESPONSE_TYPE.to_owned(),
                // Responses without an explicit flag are treated as failures.
                success: wire.success.unwrap_or(false),
                payload,
            }));
        }
    }

    let message = Message {
        request_id: wire.request_id,
        action: wire.action,
        kind: wire.kind,
        success: wire.success,
        payload,
    };
    if is_control_action(&message.action) {
        Ok(Inbound::Control(message))
    } else {
        Ok(Inbound::Push(message))
    }
}

/// Accept `request_id` as either a JSON string or an integer.
fn lenient_request_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
