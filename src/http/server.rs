//! HTTPS server startup and lifecycle.
//!
//! [`HttpsServer`] owns everything the listener needs: the bound socket, the
//! TLS context and the router. It is created by [`HttpsServer::bind`], which
//! fails before anything listens if the certificate pair or the socket is
//! unusable, and consumed by [`HttpsServer::serve`]. The socket is released
//! when the value is dropped, whichever way the process exits.
//!
//! Lifecycle: `Starting → Listening → Stopping → Stopped`.

use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::error::StartupError;

use super::tls;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to load TLS certificate/key '{}': {reason}", path.display())]
    Tls { path: PathBuf, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(String),
}

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Starting,
    Listening,
    Stopping,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cloneable control handle for a running server.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Handle,
    state: Arc<watch::Sender<ServerState>>,
    grace: Duration,
}

impl ServerHandle {
    fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        Self {
            inner: Handle::new(),
            state: Arc::new(state),
            grace,
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Wait until the server has reached `target` or any later state.
    pub async fn wait_for(&self, target: ServerState) -> ServerState {
        let mut rx = self.subscribe();
        // Copy out before `rx` goes away; the sender lives as long as this handle
        let reached = rx
            .wait_for(|state| *state >= target)
            .await
            .map(|state| *state)
            .unwrap_or_else(|_| self.state());
        reached
    }

    /// Stop accepting connections and let open ones finish within the grace period.
    pub fn shutdown(&self) {
        if self.advance(ServerState::Stopping) {
            tracing::info!(
                grace_seconds = self.grace.as_secs(),
                "Graceful shutdown initiated"
            );
        }
        self.inner.graceful_shutdown(Some(self.grace));
    }

    /// Move forward to `next`. States never go backwards.
    fn advance(&self, next: ServerState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(state = %next, "Server state changed");
        }
        changed
    }
}

/// An HTTPS listener bound and ready to serve.
pub struct HttpsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: RustlsConfig,
    app: Router,
    handle: ServerHandle,
}

impl HttpsServer {
    /// Load the TLS context, then bind the socket.
    ///
    /// Certificate problems are detected before the bind, so a failed start
    /// never leaves a port open.
    pub async fn bind(config: &AppConfig, app: Router) -> Result<Self, StartupError> {
        let handle = ServerHandle::new(Duration::from_secs(config.http.shutdown_grace_seconds));

        let tls = tls::load_rustls_config(&config.tls.cert_path, &config.tls.key_path).await?;

        let addr = config.http.socket_addr()?;
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        tracing::info!(
            addr = %local_addr,
            cert = %config.tls.cert_path.display(),
            key = %config.tls.key_path.display(),
            "Bound HTTPS listener"
        );

        Ok(Self {
            listener,
            local_addr,
            tls,
            app,
            handle,
        })
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Serve until the handle is shut down.
    pub async fn serve(self) -> Result<(), ServerError> {
        let HttpsServer {
            listener,
            local_addr,
            tls,
            app,
            handle,
        } = self;

        let watcher = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                addr = watcher.inner.listening() => {
                    if addr.is_some() {
                        watcher.advance(ServerState::Listening);
                    }
                }
                _ = watcher.wait_for(ServerState::Stopping) => {}
            }
        });

        let result = axum_server::from_tcp_rustls(listener, tls)
            .handle(handle.inner.clone())
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(e.to_string()));

        handle.advance(ServerState::Stopping);
        handle.advance(ServerState::Stopped);

        match &result {
            Ok(()) => tracing::info!(addr = %local_addr, "HTTPS server stopped"),
            Err(e) => tracing::error!(addr = %local_addr, error = %e, "HTTPS server failed"),
        }

        result
    }
}
