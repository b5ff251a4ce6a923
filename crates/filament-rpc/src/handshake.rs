//! Authentication handshake — one state machine per transport session.
//!
//! `Connected → AuthSent → Authenticated`. A rejected token leaves the
//! session in `Connected` forever: no error event is sent, the connection
//! stays open but inert, and the initiating side's only failure signal is
//! the absence of `authenticated`.

use filament_wire::AuthPayload;
use subtle::ConstantTimeEq;

/// Identity placeholder when the embedder supplies none.
pub const IDENTITY_UNAVAILABLE: &str = "(unavailable)";

/// Handshake progress on the initiating side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Transport is up; credentials not yet presented.
    Connected,
    /// Credentials presented; awaiting confirmation.
    AuthSent,
    /// Confirmation received; the session is usable in both directions.
    Authenticated,
}

/// Initiating-side handshake state machine.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    identity: String,
}

impl Handshake {
    /// Create a handshake with a best-effort client identity.
    pub fn new(identity: Option<String>) -> Self {
        Self {
            state: HandshakeState::Connected,
            identity: identity.unwrap_or_else(|| IDENTITY_UNAVAILABLE.to_string()),
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The identity presented to the receiver.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Produce the credential payload to emit and move to `AuthSent`.
    pub fn credentials(&mut self, token: &str) -> AuthPayload {
        self.state = HandshakeState::AuthSent;
        AuthPayload {
            identity: self.identity.clone(),
            token: token.to_string(),
        }
    }

    /// Record the receiver's confirmation. Returns `true` on the
    /// `AuthSent → Authenticated` transition, `false` if the confirmation
    /// was unexpected in the current state.
    pub fn confirm(&mut self) -> bool {
        match self.state {
            HandshakeState::AuthSent => {
                self.state = HandshakeState::Authenticated;
                true
            }
            _ => false,
        }
    }
}

/// Receiver-side token check: exact equality, constant time.
pub fn verify_token(presented: &str, expected: &str) -> bool {
    ConstantTimeEq::ct_eq(presented.as_bytes(), expected.as_bytes()).into()
}
