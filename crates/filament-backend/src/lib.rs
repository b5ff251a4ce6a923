//! Mobile-code protocol for the filament bridge.
//!
//! The extension side describes a backend as data — named surface entries,
//! a nested set of remotely-callable functions, dependency identifiers, and
//! an optional initializer — and the privileged process reconstructs and
//! activates it. Behavior never crosses the wire as source text: every
//! function slot is a reference into a fixed handler catalog the receiving
//! side compiled in.
//!
//! Activation sequencing: resolve dependencies → run `init` once → bind and
//! register the rpc surface → signal readiness. Any activation error aborts
//! silently from the initiating side's point of view (no `ready` arrives).

pub mod catalog;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod install;

pub use catalog::{BackendHandler, HandlerCatalog};
pub use context::{
    BackendContext, Dependency, DependencyResolver, HostHandle, RpcCaller, StaticResolver,
};
pub use descriptor::{BackendDescriptor, SurfaceEntry};
pub use error::InstallError;
pub use install::{ActivatedBackend, Installer};
