//! Wire protocol event types.
//!
//! All communication between a filament client and server uses JSON-framed
//! events over one duplex connection. Each event is prefixed with a 4-byte
//! big-endian length header. Reply events use a dynamic name (the reply
//! address of the request they answer), so the envelope keeps the event name
//! as an open string rather than a closed enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Credential presentation, initiator → receiver.
pub const EVENT_AUTH: &str = "auth";
/// Handshake success, receiver → initiator. No payload.
pub const EVENT_AUTHENTICATED: &str = "authenticated";
/// Remote function invocation, either direction.
pub const EVENT_RPC_REQUEST: &str = "rpc-request";
/// Backend activation complete, receiver → initiator. No payload.
pub const EVENT_READY: &str = "ready";

/// Reserved function name the receiving side calls to pull the serialized
/// backend descriptor. Dispatched through the ordinary request/reply path.
pub const FN_SERVER_SIDE_INSTALL: &str = "serverSideInstall";

/// Prefix of every reply address minted by the correlation layer.
pub const REPLY_ADDRESS_PREFIX: &str = "rpc-reply-";

/// A wire protocol event (envelope).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEvent {
    /// Event name — one of the fixed vocabulary, or a per-call reply address.
    pub event: String,
    /// Event payload. `Null` for the payload-less lifecycle events.
    #[serde(default)]
    pub payload: Value,
}

impl WireEvent {
    /// Build an event with an arbitrary name and payload.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Build an `auth` event.
    pub fn auth(payload: &AuthPayload) -> Result<Self, WireError> {
        Ok(Self::new(EVENT_AUTH, serde_json::to_value(payload)?))
    }

    /// Build an `authenticated` event (no payload).
    pub fn authenticated() -> Self {
        Self::new(EVENT_AUTHENTICATED, Value::Null)
    }

    /// Build an `rpc-request` event.
    pub fn rpc_request(payload: &RpcRequestPayload) -> Result<Self, WireError> {
        Ok(Self::new(EVENT_RPC_REQUEST, serde_json::to_value(payload)?))
    }

    /// Build a reply event addressed to a specific pending call.
    pub fn reply(reply_address: impl Into<String>, result: Value) -> Self {
        Self::new(reply_address, result)
    }

    /// Build a `ready` event (no payload).
    pub fn ready() -> Self {
        Self::new(EVENT_READY, Value::Null)
    }

    /// Whether this event's name is a reply address rather than a fixed verb.
    pub fn is_reply(&self) -> bool {
        self.event.starts_with(REPLY_ADDRESS_PREFIX)
    }
}

/// Payload of the `auth` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthPayload {
    /// Client identity, best-effort (`(unavailable)` when the embedder has none).
    pub identity: String,
    /// The pre-shared secret.
    pub token: String,
}

/// Payload of the `rpc-request` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequestPayload {
    /// Name of the function to invoke on the remote side.
    pub function: String,
    /// Positional arguments.
    #[serde(default)]
    pub arguments: Vec<Value>,
    /// Event name the reply must be addressed to.
    pub reply_address: String,
}

/// Errors from the wire layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Event too large: {size} bytes (max {max})")]
    EventTooLarge { size: u32, max: u32 },
}

/// Maximum single event size (16 MB).
pub const MAX_EVENT_SIZE: u32 = 16 * 1024 * 1024;

/// Encode a wire event to bytes (4-byte big-endian length + JSON).
pub fn encode_event(event: &WireEvent) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(event)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireEvent.
pub fn decode_event(body: &[u8]) -> Result<WireEvent, WireError> {
    Ok(serde_json::from_slice(body)?)
}
