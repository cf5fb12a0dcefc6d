//! Router assembly.
//!
//! There are no application routes: every request goes to the static file
//! service. Responses get a revalidating Cache-Control header unless the file
//! service already set one, and every request runs inside a request-id span.

use axum::{middleware, Router};
use axum::http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{AppConfig, CACHE_CONTROL_FILES};
use crate::http::static_files::create_static_service;
use crate::middleware::request_id_layer;

/// Creates the router serving the configured document root.
pub fn create_router(config: &AppConfig) -> Router {
    tracing::debug!(
        root = %config.files.root.display(),
        directory_listing = config.files.directory_listing,
        "Serving static files"
    );

    Router::new()
        .fallback_service(create_static_service(&config.files))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_FILES),
        ))
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
