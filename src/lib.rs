//! quizserve: serve the ArUco quiz game over HTTPS on the local network.
//!
//! Browsers only grant camera access to secure contexts, so phones on the LAN
//! need HTTPS even for a development page. This crate binds a TLS listener
//! with an operator-provided (usually self-signed) certificate, serves the
//! working directory as static files, and reports the LAN address to open.

pub mod app;
pub mod banner;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod net;

pub use app::create_router;
pub use config::AppConfig;
pub use error::{FileError, StartupError};
