//! TLS configuration for clients of a service behind a private CA.
//!
//! Builds a [`rustls::ClientConfig`] that trusts only the certificates in
//! a caller-supplied PEM bundle, never the platform roots.

use std::path::Path;

use rustls::ClientConfig;

use crate::Result;

/// Builds a [`ClientConfig`] whose root store contains only the CA
/// certificates found in `pem`.
///
/// # Errors
///
/// Returns [`KronosError::Tls`](crate::KronosError::Tls) if the PEM cannot
/// be parsed or holds no usable certificate.
pub fn build_tls_config(pem: &[u8]) -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();

    let certs: Vec<_> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| crate::KronosError::Tls(format!("failed to parse CA PEM: {e}")))?;

    let (added, _ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(crate::KronosError::Tls(
            "CA PEM contains no usable certificates".to_string(),
        ));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

/// Reads a PEM bundle from disk and passes it to [`build_tls_config`].
///
/// # Errors
///
/// Returns [`KronosError::Io`](crate::KronosError::Io) if the file cannot
/// be read, otherwise as [`build_tls_config`].
pub fn load_tls_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let pem = std::fs::read(path)?;
    build_tls_config(&pem)
}
