//! TLS configuration and certificate loading.
//!
//! Certificates come from PEM files when configured; otherwise a short-lived
//! self-signed certificate is generated for the listen host at startup.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use rcgen::{CertificateParams, KeyPair};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::ListenerConfig;

/// Lifetime of a generated certificate.
pub const SELF_SIGNED_VALIDITY: time::Duration = time::Duration::hours(3);

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    MissingFile(String),

    #[error("failed to load certificate: {0}")]
    Load(#[from] std::io::Error),

    #[error("failed to generate self-signed certificate: {0}")]
    Generate(#[from] rcgen::Error),
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    for path in [cert_path, key_path] {
        if !path.exists() {
            return Err(TlsError::MissingFile(path.display().to_string()));
        }
    }
    Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?)
}

/// PEM-encoded certificate and private key.
#[derive(Debug, Clone)]
pub struct SelfSigned {
    pub cert_pem: String,
    pub key_pem: String,
    pub not_after: OffsetDateTime,
}

/// Generate a certificate for `host` valid from now for [`SELF_SIGNED_VALIDITY`].
pub fn generate_self_signed(host: &str) -> Result<SelfSigned, TlsError> {
    let mut names = vec![host.to_string()];
    if host == "localhost" {
        names.push("127.0.0.1".to_string());
    }

    let mut params = CertificateParams::new(names)?;
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    let not_after = now + SELF_SIGNED_VALIDITY;
    params.not_after = not_after;

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(SelfSigned {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        not_after,
    })
}

/// TLS settings for `listener`, or `None` for plain HTTP.
pub async fn server_config(listener: &ListenerConfig) -> Result<Option<RustlsConfig>, TlsError> {
    if !listener.is_secure() {
        return Ok(None);
    }

    if let Some(tls) = &listener.tls {
        tracing::info!(cert = %tls.cert_path, "Loading TLS certificate");
        return load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
            .await
            .map(Some);
    }

    let generated = generate_self_signed(&listener.address)?;
    tracing::info!(
        host = %listener.address,
        not_after = %generated.not_after,
        "Generated self-signed certificate"
    );
    let config = RustlsConfig::from_pem(
        generated.cert_pem.into_bytes(),
        generated.key_pem.into_bytes(),
    )
    .await?;
    Ok(Some(config))
}
