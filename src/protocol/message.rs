//! Protocol message types

use bytes::Bytes;

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message (no type byte)
    Startup {
        /// Protocol version
        version: i32,
        /// Startup parameters (user, database, ...)
        params: Vec<(String, String)>,
    },

    /// SSLRequest (no type byte)
    SslRequest,

    /// Cleartext password
    Password(String),

    /// First SASL message, naming the chosen mechanism
    SaslInitialResponse {
        /// Mechanism name (e.g. "SCRAM-SHA-256")
        mechanism: String,
        /// client-first-message
        data: Vec<u8>,
    },

    /// Subsequent SASL message
    SaslResponse(Vec<u8>),

    /// Simple query
    Query(String),

    /// Terminate
    Terminate,
}

/// Backend message (server → client)
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Backend process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Command complete, carrying the command tag
    CommandComplete(String),

    /// Data row; `None` is SQL NULL
    DataRow(Vec<Option<Bytes>>),

    /// Response to an empty query string
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ErrorFields),

    /// Notice response
    NoticeResponse(ErrorFields),

    /// Run-time parameter report
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Ready for query
    ReadyForQuery {
        /// Transaction status (`I`, `T` or `E`)
        status: u8,
    },

    /// Row description (column names only; type metadata is not needed here)
    RowDescription(Vec<String>),
}

/// Authentication request variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication OK
    Ok,
    /// Cleartext password required
    CleartextPassword,
    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },
    /// SASL mechanisms offered by the server
    Sasl {
        /// Mechanism names
        mechanisms: Vec<String>,
    },
    /// SASL server challenge
    SaslContinue {
        /// server-first-message
        data: Vec<u8>,
    },
    /// SASL server final message
    SaslFinal {
        /// server-final-message
        data: Vec<u8>,
    },
}

/// Error/notice fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity (FATAL, ERROR, WARNING, ...)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("unknown error"))?;
        if let Some(code) = &self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}
