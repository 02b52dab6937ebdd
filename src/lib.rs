//! pg-bootstrap: connect to a Postgres service that may still be starting up
//!
//! Services launched by an orchestrator (compose, Kubernetes, systemd) often
//! come up before the database they depend on is accepting connections. This
//! crate replaces "wait until healthy" hooks with an explicit, in-process
//! retry contract:
//!
//! * [`RetryPolicy`] bounds the number of attempts, the wait between them and
//!   the time a single attempt may take
//! * every failure is classified as transient (retry) or fatal (give up now)
//! * a [`Connection`] is only returned after a complete startup handshake
//!
//! ```no_run
//! # async fn example() -> pg_bootstrap::Result<()> {
//! use pg_bootstrap::{connect, ConnectionConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::builder("db", 5432, "userinfo")
//!     .user("app")
//!     .password("secret")
//!     .build();
//! let policy = RetryPolicy::builder()
//!     .max_attempts(10)
//!     .backoff_interval(Duration::from_secs(1))
//!     .build();
//!
//! let conn = connect(&config, &policy).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use bootstrap::{
    connect, connect_with_tls, with_connection, BootstrapState, Bootstrapped, Bootstrapper,
    Connector, FailureClass, PgConnector, RetryPolicy, RetryPolicyBuilder,
};
pub use config::{BootstrapSettings, ConnectionInfo};
pub use connection::{
    Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionState, Credentials,
    SimpleQueryMessage, SimpleQueryRow, SslMode, TlsConfig,
};
pub use error::{Error, Result, ServerError};
