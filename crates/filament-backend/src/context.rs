//! Backend context — the explicit shared state every handler receives.
//!
//! The activated backend's functions reference sibling surface functions,
//! attached dependencies, and the outbound rpc capability through this one
//! object, passed by shared handle at every invocation. Exactly three
//! bindings reach reconstructed code: the host handle, the dependency
//! resolution capability (via the attached results), and the bound rpc
//! caller.

use crate::catalog::BackendHandler;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use filament_rpc::{RpcError, Session};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

/// A resolved dependency: a ready-to-use implementation, shape known only
/// to the handlers that asked for it.
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// Maps a dependency identifier to a ready-to-use implementation, or fails.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, name: &str) -> anyhow::Result<Dependency>;
}

/// Resolver backed by a fixed table the embedder fills at startup.
#[derive(Default)]
pub struct StaticResolver {
    deps: DashMap<String, Dependency>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a dependency under an identifier.
    pub fn insert(&self, name: impl Into<String>, dep: Dependency) {
        self.deps.insert(name.into(), dep);
    }
}

impl DependencyResolver for StaticResolver {
    fn resolve(&self, name: &str) -> anyhow::Result<Dependency> {
        self.deps
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| anyhow::anyhow!("no provider for dependency `{name}`"))
    }
}

/// Handle to the host process's environment.
#[derive(Debug, Clone)]
pub struct HostHandle {
    pid: u32,
    started_at: DateTime<Utc>,
}

impl HostHandle {
    /// Handle for the current process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// Host process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// When this handle was created (process attach time).
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Read a host environment variable.
    pub fn env(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Outbound call capability bound to one session. Handed to activated code
/// as an explicit handle; calls travel the ordinary correlation layer back
/// toward the initiating side.
#[derive(Clone)]
pub struct RpcCaller {
    session: Arc<Session>,
}

impl RpcCaller {
    /// Bind the capability to a session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Invoke a named function on the peer.
    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.session.call(function, args).await
    }
}

/// The activated backend's shared state.
pub struct BackendContext {
    host: HostHandle,
    /// Plain surface values, attached verbatim from the descriptor.
    values: HashMap<String, Value>,
    /// Sibling surface functions.
    surface: HashMap<String, Arc<dyn BackendHandler>>,
    /// Dependencies attached during activation, keyed by their declared name.
    deps: RwLock<HashMap<String, Dependency>>,
    rpc: RpcCaller,
    /// Self-handle so sibling invocations can pass the shared context on.
    weak: Weak<BackendContext>,
}

impl BackendContext {
    /// Assemble a fresh context. Dependencies are attached afterwards, one
    /// at a time, by the activation sequence.
    pub fn new(
        host: HostHandle,
        values: HashMap<String, Value>,
        surface: HashMap<String, Arc<dyn BackendHandler>>,
        rpc: RpcCaller,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            host,
            values,
            surface,
            deps: RwLock::new(HashMap::new()),
            rpc,
            weak: weak.clone(),
        })
    }

    /// The host process handle.
    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// The bound outbound rpc capability.
    pub fn rpc(&self) -> &RpcCaller {
        &self.rpc
    }

    /// A plain surface value by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Attach a resolved dependency under its declared name.
    pub fn attach_dependency(&self, name: impl Into<String>, dep: Dependency) {
        let mut deps = self.deps.write().unwrap_or_else(|e| e.into_inner());
        deps.insert(name.into(), dep);
    }

    /// An attached dependency by name.
    pub fn dependency(&self, name: &str) -> Option<Dependency> {
        let deps = self.deps.read().unwrap_or_else(|e| e.into_inner());
        deps.get(name).map(Arc::clone)
    }

    /// Invoke a sibling surface function.
    pub async fn call_surface(&self, name: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let handler = self
            .surface
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| anyhow::anyhow!("no surface function `{name}`"))?;
        let cx = self
            .weak
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("backend context dropped"))?;
        handler.call(cx, args).await
    }
}
