//! Privileged-process endpoint of the filament bridge.
//!
//! A [`BridgeServer`] listens for extension connections on localhost. Each
//! connection gets its own session: the extension must present the shared
//! token before anything else is processed, and once authenticated the
//! server pulls the extension's backend descriptor, activates it against the
//! process's handler catalog, and signals readiness.

mod server;
mod sessions;

pub use server::{BridgeServer, ServerConfig, ServerError};
pub use sessions::{SessionEntry, SessionState, SessionTable};
