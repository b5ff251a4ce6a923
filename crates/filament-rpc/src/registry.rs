//! Service registry — per-session mapping of callable-function names.
//!
//! Mutated by local declarations at session start and, on the process side,
//! by backend activation. Entries are never removed within a session's
//! lifetime; re-registering a name replaces the previous entry (last wins).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// An invocable function implementation.
///
/// Implementations may suspend and must tolerate concurrent invocation —
/// inbound requests are dispatched without a serialization lock. Return
/// values must be plain serializable data. An `Err` is caught and logged by
/// the dispatch path and produces no reply.
#[async_trait]
pub trait Service: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value>;
}

/// Adapter so plain async closures can be registered as services.
struct FnService<F>(F);

#[async_trait]
impl<F, Fut> Service for FnService<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// Per-session mapping from function name to implementation.
///
/// Cloning produces an independent registry holding the same
/// implementations — the server clones its base declarations into each new
/// session so installed backends never leak across sessions.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a name. Last registration wins.
    pub fn register(&self, name: impl Into<String>, service: Arc<dyn Service>) {
        self.services.insert(name.into(), service);
    }

    /// Register an async closure under a name.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(name, Arc::new(FnService(f)));
    }

    /// Look up an implementation by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of all registered functions (for diagnostics).
    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
