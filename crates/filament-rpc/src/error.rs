//! RPC-layer error types.

use filament_wire::WireError;
use thiserror::Error;

/// Errors surfaced to a local caller of [`Session::call`](crate::Session::call).
///
/// Remote failures (unknown function, implementation error) are never
/// surfaced here — the protocol answers them with silence and the pending
/// call stays outstanding until the session goes away.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Outbound call attempted before the handshake completed, or after
    /// the session was destroyed. Fails locally, never reaches the wire.
    #[error("Backend not available")]
    BackendUnavailable,

    /// The session was destroyed while this call was in flight; its pending
    /// call was abandoned.
    #[error("Session closed")]
    SessionClosed,

    /// The transport rejected the outbound request.
    #[error(transparent)]
    Wire(#[from] WireError),
}
