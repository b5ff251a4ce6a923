//! Handler catalog — the fixed set of implementations a descriptor may name.
//!
//! The catalog is assembled at process start, before any session exists.
//! Descriptors can only reference what the catalog already contains, which
//! is what makes received descriptors data rather than code.

use crate::context::BackendContext;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A backend function implementation. Receives the activated backend's
/// context explicitly — sibling functions, attached dependencies, and the
/// bound rpc caller are all reached through it, never through ambient state.
#[async_trait]
pub trait BackendHandler: Send + Sync {
    async fn call(&self, cx: Arc<BackendContext>, args: Vec<Value>) -> anyhow::Result<Value>;
}

/// Adapter so async closures can be catalogued.
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> BackendHandler for FnHandler<F>
where
    F: Fn(Arc<BackendContext>, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, cx: Arc<BackendContext>, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.0)(cx, args).await
    }
}

/// Build-time map from handler id to implementation.
#[derive(Default)]
pub struct HandlerCatalog {
    handlers: DashMap<String, Arc<dyn BackendHandler>>,
}

impl HandlerCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under an id.
    pub fn register(&self, id: impl Into<String>, handler: Arc<dyn BackendHandler>) {
        self.handlers.insert(id.into(), handler);
    }

    /// Register an async closure under an id.
    pub fn register_fn<F, Fut>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(Arc<BackendContext>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(id, Arc::new(FnHandler(f)));
    }

    /// Resolve a descriptor reference.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn BackendHandler>> {
        self.handlers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Ids of all catalogued handlers (for diagnostics).
    pub fn ids(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}
