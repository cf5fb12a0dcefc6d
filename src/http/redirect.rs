//! HTTP to HTTPS redirect server.
//!
//! Phones often try `http://` first. When enabled, a plain HTTP listener
//! answers every request with a permanent redirect to the HTTPS port, and
//! stops together with the main server.

use std::net::SocketAddr;

use axum::http::Uri;
use axum::response::Redirect;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;
use axum_server::Handle;

use super::server::{ServerHandle, ServerState};

/// Spawn an HTTP server on `addr` that redirects all requests to HTTPS.
///
/// This runs in the background and does not block. Failure to bind is logged,
/// the HTTPS server keeps running.
pub fn spawn_redirect_server(addr: SocketAddr, https_port: u16, server: ServerHandle) {
    let handle = Handle::new();

    let stopper = handle.clone();
    tokio::spawn(async move {
        server.wait_for(ServerState::Stopping).await;
        stopper.shutdown();
    });

    tokio::spawn(async move {
        tracing::info!(%addr, https_port, "Starting HTTP->HTTPS redirect server");

        let app = Router::new().fallback(any(move |Host(host): Host, uri: Uri| async move {
            let target = https_url(&host, &uri, https_port);
            tracing::debug!(from = %uri, to = %target, "Redirecting HTTP to HTTPS");
            Redirect::permanent(&target)
        }));

        match axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
        {
            Ok(()) => {
                tracing::debug!("HTTP redirect server stopped");
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "HTTP redirect server failed");
            }
        }
    });
}

/// Build the HTTPS URL for a plain HTTP request.
pub fn https_url(host: &str, uri: &Uri, https_port: u16) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if https_port == 443 {
        format!("https://{}{}", strip_port(host), path_and_query)
    } else {
        format!("https://{}:{}{}", strip_port(host), https_port, path_and_query)
    }
}

/// Remove the port from a Host header value, keeping IPv6 brackets.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}
