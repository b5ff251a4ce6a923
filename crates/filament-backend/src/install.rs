//! Backend activation — reconstruct a descriptor and bring it live.
//!
//! Steps, in order:
//! 1. Parse the install text and resolve every catalog reference inside a
//!    fresh context (this is the "evaluation" of the received descriptor).
//! 2. Resolve the `requires` list one name at a time and attach each result
//!    onto the context under its declared name.
//! 3. Run `init` once, if declared. It sees siblings, dependencies, and the
//!    bound rpc caller through the context, and may suspend on outbound
//!    calls of its own.
//! 4. Bind every rpc-surface function to the context and register it into
//!    the session's service registry under its own name.
//!
//! Any error aborts activation: the caller must not emit `ready`, which is
//! the only failure signal the initiating side ever gets.

use crate::catalog::{BackendHandler, HandlerCatalog};
use crate::context::{BackendContext, DependencyResolver, HostHandle, RpcCaller};
use crate::descriptor::{BackendDescriptor, SurfaceEntry};
use crate::error::InstallError;

use async_trait::async_trait;
use filament_rpc::{Service, Session};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A successfully activated backend.
pub struct ActivatedBackend {
    /// The live context shared by every bound function.
    pub context: Arc<BackendContext>,
    /// Names registered into the session's service registry.
    pub rpc_names: Vec<String>,
}

/// An rpc-surface function bound to its backend's context, exposed as an
/// ordinary service.
struct BoundRpcService {
    context: Arc<BackendContext>,
    handler: Arc<dyn BackendHandler>,
}

#[async_trait]
impl Service for BoundRpcService {
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        self.handler.call(Arc::clone(&self.context), args).await
    }
}

/// Receiving-side installer: catalog + resolver + host handle, fixed for
/// the process lifetime and shared by every session.
pub struct Installer {
    catalog: Arc<HandlerCatalog>,
    resolver: Arc<dyn DependencyResolver>,
    host: HostHandle,
}

impl Installer {
    pub fn new(catalog: Arc<HandlerCatalog>, resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            catalog,
            resolver,
            host: HostHandle::current(),
        }
    }

    /// Reconstruct the descriptor from its text form and activate it on a
    /// session. On success the rpc surface is callable through the
    /// session's registry; the caller is responsible for emitting `ready`.
    pub async fn activate(
        &self,
        text: &str,
        session: &Arc<Session>,
    ) -> Result<ActivatedBackend, InstallError> {
        let descriptor = BackendDescriptor::from_install_text(text)?;
        debug!(
            session = %session.id(),
            surface = descriptor.surface.len(),
            rpc = descriptor.rpc.len(),
            requires = descriptor.requires.len(),
            "Reconstructed backend descriptor"
        );

        // Resolve every reference up front: a descriptor naming unknown
        // handlers fails evaluation before anything runs.
        let mut values = HashMap::new();
        let mut surface = HashMap::new();
        for (name, entry) in &descriptor.surface {
            match entry {
                SurfaceEntry::Value(v) => {
                    values.insert(name.clone(), v.clone());
                }
                SurfaceEntry::Handler(id) => {
                    surface.insert(name.clone(), self.lookup(id)?);
                }
            }
        }
        let rpc_surface: Vec<(String, Arc<dyn BackendHandler>)> = descriptor
            .rpc
            .iter()
            .map(|(name, id)| Ok((name.clone(), self.lookup(id)?)))
            .collect::<Result<_, InstallError>>()?;
        let init = descriptor.init.as_deref().map(|id| self.lookup(id)).transpose()?;

        let context = BackendContext::new(
            self.host.clone(),
            values,
            surface,
            RpcCaller::new(Arc::clone(session)),
        );

        // (1) Dependencies, in declaration order.
        for name in &descriptor.requires {
            let dep = self
                .resolver
                .resolve(name)
                .map_err(|source| InstallError::Dependency {
                    name: name.clone(),
                    source,
                })?;
            context.attach_dependency(name.clone(), dep);
        }

        // (2) Initializer, exactly once.
        if let Some(init) = init {
            init.call(Arc::clone(&context), vec![])
                .await
                .map_err(InstallError::Init)?;
        }

        // (3) Bind and register the rpc surface.
        let mut rpc_names = Vec::with_capacity(rpc_surface.len());
        for (name, handler) in rpc_surface {
            session.registry().register(
                name.clone(),
                Arc::new(BoundRpcService {
                    context: Arc::clone(&context),
                    handler,
                }),
            );
            rpc_names.push(name);
        }

        info!(
            session = %session.id(),
            functions = rpc_names.len(),
            "Backend activated"
        );

        Ok(ActivatedBackend { context, rpc_names })
    }

    fn lookup(&self, id: &str) -> Result<Arc<dyn BackendHandler>, InstallError> {
        self.catalog
            .resolve(id)
            .ok_or_else(|| InstallError::UnknownHandler(id.to_string()))
    }
}
