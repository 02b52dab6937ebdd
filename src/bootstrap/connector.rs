//! One connection attempt

use crate::connection::{Connection, ConnectionConfig, TlsConfig};
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Performs a single connection attempt.
///
/// The bootstrapper owns retries, timeouts and classification; a connector
/// only tries once and reports what happened.
pub trait Connector: Send + Sync {
    /// What a successful attempt produces
    type Handle: Send;

    /// Try to connect once
    fn connect<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Self::Handle>>;
}

/// Connector that opens a Postgres [`Connection`]
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    tls: Option<TlsConfig>,
}

impl PgConnector {
    /// Connector using the platform trust store when TLS is requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector using an explicit TLS configuration
    pub fn with_tls(tls: TlsConfig) -> Self {
        Self { tls: Some(tls) }
    }
}

impl Connector for PgConnector {
    type Handle = Connection;

    fn connect<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Connection>> {
        Connection::connect(config, self.tls.as_ref()).boxed()
    }
}
