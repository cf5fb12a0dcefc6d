//! HTTPS server module.
//!
//! The server always speaks TLS with an operator-provided certificate pair;
//! browsers only expose camera APIs to secure contexts.
//!
//! The module provides:
//! - TLS context loading with fail-fast diagnostics
//! - The owned server value and its lifecycle handle
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Static file serving with a directory listing fallback
//! - Optional HTTP to HTTPS redirect

pub mod redirect;
pub mod server;
pub mod shutdown;
pub mod static_files;
pub mod tls;

pub use server::{HttpsServer, ServerError, ServerHandle, ServerState};
