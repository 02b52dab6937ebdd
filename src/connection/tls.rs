//! TLS configuration

use crate::{Error, Result};
use rustls::{ClientConfig, RootCertStore};
use std::path::PathBuf;
use std::sync::Arc;

/// SSL/TLS mode, matching the libpq `sslmode` names this crate supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Plaintext only
    #[default]
    Disable,
    /// Try TLS, fall back to plaintext if the server refuses it
    Prefer,
    /// TLS required; the certificate is verified against the trust roots
    Require,
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
        })
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, prefer or require",
                other
            ))),
        }
    }
}

/// Compiled TLS client settings
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_path: Option<PathBuf>,
    client_config: Arc<ClientConfig>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    /// Start building a TLS configuration
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// rustls client configuration
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Custom CA file, if one was configured
    pub fn ca_cert_path(&self) -> Option<&std::path::Path> {
        self.ca_cert_path.as_deref()
    }
}

/// Builder for [`TlsConfig`]
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<PathBuf>,
}

impl TlsConfigBuilder {
    /// Trust only the certificates in this PEM file instead of the system roots
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Build the configuration.
    ///
    /// Without a CA file the platform trust store is used, falling back to
    /// the bundled Mozilla roots when the platform has none (minimal images).
    pub fn build(self) -> Result<TlsConfig> {
        let roots = match &self.ca_cert_path {
            Some(path) => load_pem_roots(path)?,
            None => platform_roots(),
        };

        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_config: Arc::new(client_config),
        })
    }
}

fn load_pem_roots(path: &std::path::Path) -> Result<RootCertStore> {
    let pem = std::fs::read(path).map_err(|e| {
        Error::Config(format!(
            "failed to read CA certificate '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut store = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|e| {
            Error::Config(format!(
                "failed to parse CA certificate '{}': {}",
                path.display(),
                e
            ))
        })?;
        store
            .add(cert)
            .map_err(|e| Error::Config(format!("unusable CA certificate: {}", e)))?;
    }

    if store.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in '{}'",
            path.display()
        )));
    }
    Ok(store)
}

fn platform_roots() -> RootCertStore {
    let mut store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    let (added, ignored) = store.add_parsable_certificates(native.certs);
    if ignored > 0 || !native.errors.is_empty() {
        tracing::debug!(added, ignored, errors = native.errors.len(), "loaded platform roots");
    }
    if store.is_empty() {
        tracing::debug!("no platform roots, using bundled webpki roots");
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}
