//! TLS configuration for the gateway's own listener.

use std::fs;
use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load TLS configuration from certificate and key files.
///
/// The certificate file is checked up front so a wrong path or a file without
/// PEM certificates fails at startup with a readable message.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    if !key_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    let pem = fs::read(cert_path).map_err(|e| {
        io::Error::new(e.kind(), format!("Certificate file {:?}: {}", cert_path, e))
    })?;
    let count = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()?
        .len();
    if count == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No PEM certificates in {:?}", cert_path),
        ));
    }

    tracing::debug!(cert_path = ?cert_path, certificates = count, "Loaded listener certificate chain");
    RustlsConfig::from_pem_file(cert_path, key_path).await
}
