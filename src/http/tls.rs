//! Certificate and key loading.
//!
//! The certificate pair is supplied by the operator (usually a self-signed
//! `cert.pem`/`key.pem` next to the quiz files). Anything wrong with it is
//! fatal and reported before a socket is bound.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use super::ServerError;

/// Install aws-lc-rs as the process-wide rustls provider.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}

/// Read a PEM file, rejecting anything that is not a regular file.
fn read_pem_file(path: &Path) -> Result<Vec<u8>, ServerError> {
    let tls_error = |reason: String| ServerError::Tls {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(path).map_err(|e| tls_error(e.to_string()))?;
    if !metadata.is_file() {
        return Err(tls_error("not a regular file".to_string()));
    }

    std::fs::read(path).map_err(|e| tls_error(e.to_string()))
}

/// Build the TLS server context from PEM files.
pub async fn load_rustls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ServerError> {
    let cert_pem = read_pem_file(cert_path)?;
    let key_pem = read_pem_file(key_path)?;

    install_crypto_provider();

    let config = RustlsConfig::from_pem(cert_pem, key_pem)
        .await
        .map_err(|e| ServerError::Tls {
            path: cert_path.to_path_buf(),
            reason: format!(
                "certificate/key pair with '{}' rejected: {}",
                key_path.display(),
                e
            ),
        })?;

    tracing::debug!(cert = %cert_path.display(), key = %key_path.display(), "Loaded TLS certificate");
    Ok(config)
}
