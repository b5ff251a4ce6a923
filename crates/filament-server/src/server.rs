//! BridgeServer — TCP listener and per-connection session lifecycle.
//!
//! Each accepted connection runs: token check → session authenticated →
//! backend pull (`serverSideInstall`) → activation → `ready`. A connection
//! presenting a bad token is left open and inert; no error event exists in
//! the protocol.

use crate::sessions::{SessionEntry, SessionState, SessionTable};

use filament_backend::Installer;
use filament_rpc::{verify_token, ServiceRegistry, Session};
use filament_wire::{
    AuthPayload, TcpTransport, Transport, WireEvent, EVENT_AUTH, FN_SERVER_SIDE_INSTALL,
};

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Errors from server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("A shared token is required; refusing to listen without one")]
    MissingToken,
}

/// Configuration for a BridgeServer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
    /// Pre-shared secret extensions must present. Required — the server
    /// refuses to start without it.
    pub token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            token: String::new(),
        }
    }
}

/// The privileged-process endpoint: listens for extension connections and
/// owns the per-session lifecycle.
pub struct BridgeServer {
    config: ServerConfig,
    /// Local function declarations, cloned into every new session so
    /// installed backends never leak across sessions.
    services: ServiceRegistry,
    installer: Arc<Installer>,
    sessions: SessionTable,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
}

impl BridgeServer {
    /// Bind the listener and start accepting connections.
    pub async fn start(
        config: ServerConfig,
        services: ServiceRegistry,
        installer: Arc<Installer>,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), ServerError> {
        if config.token.is_empty() {
            return Err(ServerError::MissingToken);
        }

        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Filament server listening on {}", local_addr);

        let server = Arc::new(Self {
            config,
            services,
            installer,
            sessions: SessionTable::new(),
            local_addr,
        });

        let accept_server = Arc::clone(&server);
        let accept_handle = tokio::spawn(async move {
            accept_server.accept_loop(listener).await;
        });

        Ok((server, accept_handle))
    }

    /// Actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The session table.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// One connection's full lifecycle: gate on the handshake, then feed
    /// the session until the transport goes away.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let transport = Arc::new(TcpTransport::from_stream(stream)) as Arc<dyn Transport>;
        let session = Session::new(transport, self.services.clone());
        info!(session = %session.id(), "Extension connected from {}", addr);

        while let Some(event) = session.transport().recv().await {
            if session.is_authenticated() {
                if event.event == EVENT_AUTH {
                    warn!(session = %session.id(), "Repeated auth on live session; ignoring");
                } else {
                    session.dispatch(event);
                }
            } else if event.event == EVENT_AUTH {
                self.handle_auth(&session, addr, event.payload).await;
            } else {
                // Nothing is processed before the handshake, and nothing is
                // answered either — silence is the protocol's failure mode.
                warn!(
                    session = %session.id(),
                    event = %event.event,
                    "Event before authentication; dropping"
                );
            }
        }

        session.destroy();
        self.sessions.mark_disconnected(session.id());
        info!(session = %session.id(), "Extension disconnected");
    }

    async fn handle_auth(&self, session: &Arc<Session>, addr: SocketAddr, payload: Value) {
        let auth: AuthPayload = match serde_json::from_value(payload) {
            Ok(a) => a,
            Err(e) => {
                warn!(session = %session.id(), "Malformed auth payload: {}", e);
                return;
            }
        };

        info!(
            session = %session.id(),
            identity = %auth.identity,
            "Extension attempts to connect"
        );

        if !verify_token(&auth.token, &self.config.token) {
            // Deliberately silent: the extension's only failure signal is
            // that `authenticated` never arrives.
            info!(
                session = %session.id(),
                identity = %auth.identity,
                "Invalid token. Access denied"
            );
            return;
        }

        info!(
            session = %session.id(),
            identity = %auth.identity,
            "Valid token. Access granted"
        );
        session.authenticate();
        self.sessions.add(SessionEntry {
            session_id: session.id().to_string(),
            identity: auth.identity,
            address: Some(addr),
            state: SessionState::Connected,
            connected_at: chrono::Utc::now(),
        });

        if let Err(e) = session.transport().emit(WireEvent::authenticated()).await {
            warn!(session = %session.id(), "Could not confirm handshake: {}", e);
            return;
        }

        // Pull and activate the extension's backend in the background; the
        // session keeps serving ordinary calls meanwhile.
        let installer = Arc::clone(&self.installer);
        let session = Arc::clone(session);
        tokio::spawn(async move {
            Self::install_backend(installer, session).await;
        });
    }

    /// The receiving side of the mobile-code protocol: one pull, one
    /// activation, one `ready`. Every failure path logs and stops — no
    /// `ready` is the only signal the extension gets.
    async fn install_backend(installer: Arc<Installer>, session: Arc<Session>) {
        debug!(session = %session.id(), "Fetching server side install");

        let text = match session.call(FN_SERVER_SIDE_INSTALL, vec![]).await {
            Ok(Value::String(text)) => text,
            Ok(other) => {
                error!(
                    session = %session.id(),
                    "Install text must be a string, got {}",
                    other
                );
                return;
            }
            Err(e) => {
                error!(session = %session.id(), "Backend pull failed: {}", e);
                return;
            }
        };

        match installer.activate(&text, &session).await {
            Ok(activated) => {
                info!(
                    session = %session.id(),
                    functions = ?activated.rpc_names,
                    "Installed backend"
                );
                if let Err(e) = session.transport().emit(WireEvent::ready()).await {
                    warn!(session = %session.id(), "Could not signal readiness: {}", e);
                }
            }
            Err(e) => {
                error!(session = %session.id(), "Backend activation failed: {:#}", e);
            }
        }
    }
}
