//! BridgeClient — connect, authenticate, serve the backend descriptor.

use filament_backend::BackendDescriptor;
use filament_rpc::{Handshake, RpcError, ServiceRegistry, Session};
use filament_wire::{
    TcpTransport, Transport, WireError, WireEvent, EVENT_AUTH, EVENT_AUTHENTICATED, EVENT_READY,
    FN_SERVER_SIDE_INSTALL,
};

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Client-side errors. Remote rejection is deliberately absent: a bad token
/// is observable only as `authenticated()` never resolving.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("Descriptor serialization failed: {0}")]
    Descriptor(#[from] serde_json::Error),
    #[error("Connection closed")]
    Disconnected,
}

/// Connection settings for the extension side.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the privileged process's listener.
    pub addr: SocketAddr,
    /// The pre-shared secret.
    pub token: String,
    /// Best-effort client identity; a placeholder is presented when absent.
    pub identity: Option<String>,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr, token: impl Into<String>) -> Self {
        Self {
            addr,
            token: token.into(),
            identity: None,
        }
    }
}

/// The extension-side endpoint: one session over one connection.
pub struct BridgeClient {
    session: Arc<Session>,
    /// Serialized descriptor served to the process on request. Replaced
    /// wholesale by each `register_backend`; never pushed proactively.
    install_text: Arc<RwLock<String>>,
    authenticated_rx: watch::Receiver<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl BridgeClient {
    /// Connect over TCP and present credentials.
    pub async fn connect(
        config: ClientConfig,
        services: ServiceRegistry,
    ) -> Result<Self, ClientError> {
        let transport = Arc::new(TcpTransport::connect(config.addr).await?) as Arc<dyn Transport>;
        Self::with_transport(transport, config, services).await
    }

    /// Run the client over an already-established transport (used by tests
    /// and embedders with their own connection management).
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        services: ServiceRegistry,
    ) -> Result<Self, ClientError> {
        let install_text = Arc::new(RwLock::new(String::new()));

        // The reserved function the process pulls the descriptor through.
        {
            let text = Arc::clone(&install_text);
            services.register_fn(FN_SERVER_SIDE_INSTALL, move |_args| {
                let text = Arc::clone(&text);
                async move {
                    let code = text.read().unwrap_or_else(|e| e.into_inner()).clone();
                    info!(bytes = code.len(), "Serving backend install text");
                    Ok(Value::String(code))
                }
            });
        }

        let session = Session::new(transport, services);

        let mut handshake = Handshake::new(config.identity.clone());
        let credentials = handshake.credentials(&config.token);
        session
            .transport()
            .emit(WireEvent::auth(&credentials)?)
            .await?;
        info!(identity = %handshake.identity(), "Bridge connection established; credentials presented");

        let (auth_tx, authenticated_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = watch::channel(false);

        let loop_session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(event) = loop_session.transport().recv().await {
                if event.event == EVENT_AUTHENTICATED {
                    if handshake.confirm() {
                        loop_session.authenticate();
                        info!("Authenticated");
                        let _ = auth_tx.send(true);
                    } else {
                        warn!("Unexpected authenticated event");
                    }
                } else if event.event == EVENT_READY {
                    info!("Backend ready");
                    let _ = ready_tx.send(true);
                } else if event.event == EVENT_AUTH {
                    warn!("Peer sent auth to the initiating side; ignoring");
                } else {
                    loop_session.dispatch(event);
                }
            }
            loop_session.destroy();
            debug!("Bridge connection closed");
        });

        Ok(Self {
            session,
            install_text,
            authenticated_rx,
            ready_rx,
        })
    }

    /// Hold a backend descriptor for this session, replacing any previous
    /// one. Nothing is transmitted here — the process pulls the serialized
    /// form when it is ready to install.
    pub fn register_backend(&self, descriptor: &BackendDescriptor) -> Result<(), ClientError> {
        let text = descriptor.to_install_text()?;
        let mut slot = self.install_text.write().unwrap_or_else(|e| e.into_inner());
        *slot = text;
        Ok(())
    }

    /// Invoke a named function on the process side. Fails immediately with
    /// [`RpcError::BackendUnavailable`] until `authenticated` has arrived,
    /// and again after disconnect.
    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.session.call(function, args).await
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether the handshake has completed.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Suspend until the handshake completes. A rejected token never
    /// resolves this — absence of confirmation is the protocol's failure
    /// signal, so callers wanting to give up must apply their own timeout.
    pub async fn authenticated(&self) -> Result<(), ClientError> {
        Self::wait(self.authenticated_rx.clone()).await
    }

    /// Suspend until the process reports backend activation complete.
    pub async fn ready(&self) -> Result<(), ClientError> {
        Self::wait(self.ready_rx.clone()).await
    }

    async fn wait(mut rx: watch::Receiver<bool>) -> Result<(), ClientError> {
        while !*rx.borrow() {
            rx.changed().await.map_err(|_| ClientError::Disconnected)?;
        }
        Ok(())
    }
}
