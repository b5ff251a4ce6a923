//! Activation error types.
//!
//! None of these cross the wire: the initiating side only ever observes
//! activation failure as the absence of `ready`.

use thiserror::Error;

/// Errors from descriptor reconstruction and activation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The install text was not a valid descriptor.
    #[error("Malformed install text: {0}")]
    Parse(#[from] serde_json::Error),

    /// A surface, rpc, or init slot referenced a handler the catalog does
    /// not contain.
    #[error("Unknown handler reference `{0}`")]
    UnknownHandler(String),

    /// A declared dependency could not be resolved.
    #[error("Dependency `{name}` could not be resolved")]
    Dependency {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The backend's initializer failed.
    #[error("Backend init failed")]
    Init(#[source] anyhow::Error),
}
