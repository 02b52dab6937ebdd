//! Error types

use crate::auth::ScramError;
use crate::bootstrap::FailureClass;
use crate::protocol::ErrorFields;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the server in an `ErrorResponse`, with its SQLSTATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Severity (FATAL, ERROR, ...)
    pub severity: String,
    /// Five-character SQLSTATE code
    pub code: String,
    /// Primary message
    pub message: String,
    /// Optional detail line
    pub detail: Option<String>,
    /// Optional suggestion from the server
    pub hint: Option<String>,
}

impl ServerError {
    /// Two-character SQLSTATE class (e.g. `28` for authorization errors)
    pub fn class(&self) -> &str {
        self.code.get(..2).unwrap_or("")
    }
}

impl From<ErrorFields> for ServerError {
    fn from(fields: ErrorFields) -> Self {
        Self {
            severity: fields.severity.unwrap_or_else(|| "ERROR".to_string()),
            code: fields.code.unwrap_or_default(),
            message: fields.message.unwrap_or_default(),
            detail: fields.detail,
            hint: fields.hint,
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(hint) = &self.hint {
            write!(f, "; hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport (refused, reset, lookup failure, ...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid connection configuration or retry policy
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Wire protocol violation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS negotiation or handshake failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Credentials rejected or authentication could not proceed
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// ErrorResponse from the server
    #[error("server error: {0}")]
    Server(ServerError),

    /// Server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A single attempt exceeded its time budget
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Connection is not in a state that allows the operation
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState {
        /// What the operation needed
        expected: String,
        /// What the connection was in
        actual: String,
    },

    /// Every attempt failed with a transient error
    #[error("dependency unavailable after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        /// Number of attempts performed
        attempts: u32,
        /// The last transient failure, kept for diagnostics
        last: Box<Error>,
    },

    /// The caller abandoned the bootstrap between attempts
    #[error("bootstrap cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of attempts performed before cancellation
        attempts: u32,
    },
}

impl Error {
    /// Classify this error for the retry loop.
    ///
    /// Terminal bootstrap results (`RetryBudgetExhausted`, `Cancelled`) are
    /// classified as fatal so that nesting a bootstrapper never retries them.
    pub fn classify(&self) -> FailureClass {
        match self {
            Error::Io(e) => match e.kind() {
                io::ErrorKind::PermissionDenied
                | io::ErrorKind::InvalidInput
                | io::ErrorKind::InvalidData
                | io::ErrorKind::Unsupported => FailureClass::Fatal,
                _ => FailureClass::Transient,
            },
            Error::ConnectionClosed | Error::Timeout(_) => FailureClass::Transient,
            Error::Server(err) => classify_sqlstate(err),
            Error::Authentication(_) => FailureClass::AuthenticationRejected,
            Error::Config(_) => FailureClass::ConfigurationInvalid,
            Error::Protocol(_)
            | Error::Tls(_)
            | Error::InvalidState { .. }
            | Error::RetryBudgetExhausted { .. }
            | Error::Cancelled { .. } => FailureClass::Fatal,
        }
    }

    /// Whether retrying may succeed
    pub fn is_transient(&self) -> bool {
        self.classify() == FailureClass::Transient
    }

    /// SQLSTATE code if this is a server error
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(err) => Some(&err.code),
            _ => None,
        }
    }

    /// Short label for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::Protocol(_) => "protocol",
            Error::Tls(_) => "tls",
            Error::Authentication(_) => "authentication",
            Error::Server(_) => "server",
            Error::ConnectionClosed => "connection_closed",
            Error::Timeout(_) => "timeout",
            Error::InvalidState { .. } => "invalid_state",
            Error::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
            Error::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<ScramError> for Error {
    /// A malformed exchange is a protocol violation; a refused one is an
    /// authentication failure.
    fn from(err: ScramError) -> Self {
        match err {
            ScramError::InvalidServerMessage(_) | ScramError::OutOfOrder(_) => {
                Error::Protocol(err.to_string())
            }
            ScramError::ServerError(_) | ScramError::InvalidServerSignature => {
                Error::Authentication(err.to_string())
            }
        }
    }
}

fn classify_sqlstate(err: &ServerError) -> FailureClass {
    match err.code.as_str() {
        // cannot_connect_now: the database system is starting up
        "57P03" | "57P01" | "57P02" => FailureClass::Transient,
        _ => match err.class() {
            "08" | "53" => FailureClass::Transient,
            "28" => FailureClass::AuthenticationRejected,
            _ => FailureClass::Fatal,
        },
    }
}
