//! Filament Bridge Protocol (FBP) — extension-to-process transport.
//!
//! Carries named events with JSON payloads over a single duplex connection
//! between a browser-extension endpoint and the local privileged process.
//!
//! ## Architecture
//!
//! - **WireEvent**: the `{event, payload}` envelope every message uses
//! - **Framing**: 4-byte big-endian length prefix + JSON body
//! - **Transport**: the duplex seam — emit an event, receive the next one
//! - **TcpTransport / memory pair**: the two provided transports

pub mod message;
pub mod transport;

pub use message::{
    AuthPayload, RpcRequestPayload, WireError, WireEvent, EVENT_AUTH, EVENT_AUTHENTICATED,
    EVENT_READY, EVENT_RPC_REQUEST, FN_SERVER_SIDE_INSTALL, REPLY_ADDRESS_PREFIX,
};
pub use transport::{memory_pair, MemoryTransport, TcpTransport, Transport};
