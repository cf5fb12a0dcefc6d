//! Graceful shutdown and signal handling.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM stop the server. When either is
//! received the server stops accepting new connections, gives open ones the
//! configured grace period, and the serve future completes.
//!
//! Handlers are registered when [`setup_shutdown_handler`] returns, so a
//! signal sent after the banner is printed is never lost.

use super::server::ServerHandle;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered signal sources. A source that fails to register is logged and never fires.
#[cfg(unix)]
pub struct ShutdownSignals {
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
}

#[cfg(unix)]
impl ShutdownSignals {
    pub fn register() -> Self {
        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| tracing::error!(error = %e, "Failed to install SIGINT handler"))
            .ok();
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| tracing::error!(error = %e, "Failed to install SIGTERM handler"))
            .ok();
        Self {
            interrupt,
            terminate,
        }
    }

    /// Wait for the first signal and return its name.
    pub async fn recv(self) -> &'static str {
        let Self {
            mut interrupt,
            mut terminate,
        } = self;

        let on_interrupt = async {
            match interrupt.as_mut() {
                Some(sigint) => {
                    sigint.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        let on_terminate = async {
            match terminate.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = on_interrupt => "SIGINT",
            _ = on_terminate => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn register() -> Self {
        Self
    }

    pub async fn recv(self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}

/// Register signal handlers now and shut `handle` down when one fires.
pub fn setup_shutdown_handler(handle: ServerHandle) {
    let signals = ShutdownSignals::register();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        tracing::info!(signal, "Received shutdown signal");
        handle.shutdown();
    });
}
