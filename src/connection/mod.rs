//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP, TLS, Unix socket)
//! * Startup and authentication through to `ReadyForQuery`
//! * State machine enforcement
//! * TLS configuration

mod conn;
mod state;
mod tls;
mod transport;

pub use conn::{
    quote_literal, Connection, ConnectionConfig, ConnectionConfigBuilder, Credentials,
    SimpleQueryMessage, SimpleQueryRow,
};
pub use state::ConnectionState;
pub use tls::{SslMode, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
