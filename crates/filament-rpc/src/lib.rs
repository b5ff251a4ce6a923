//! Bidirectional RPC over one filament transport session.
//!
//! Either peer can invoke named functions on the other once the session is
//! authenticated. Requests and replies are correlated by a per-call reply
//! address; there is no response ordering guarantee and no retry.
//!
//! ## Architecture
//!
//! - **Session**: one per connection — pending-call table, call sequence,
//!   authenticated flag, inbound dispatcher
//! - **ServiceRegistry**: per-session name → implementation mapping
//! - **Handshake**: the `Connected → AuthSent → Authenticated` state machine

pub mod error;
pub mod handshake;
pub mod registry;
pub mod session;

pub use error::RpcError;
pub use handshake::{verify_token, Handshake, HandshakeState, IDENTITY_UNAVAILABLE};
pub use registry::{Service, ServiceRegistry};
pub use session::Session;
