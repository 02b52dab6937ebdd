//! Postgres protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: i32 = 0x04D2_162F;

/// Largest backend message accepted (1 GiB, PostgreSQL's `PQ_LARGE_MESSAGE_LIMIT`)
pub const MAX_MESSAGE_LENGTH: usize = 1 << 30;

/// Backend message type tags
pub mod tags {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';
    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// Command complete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// Data row
    pub const DATA_ROW: u8 = b'D';
    /// Empty query response
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';
    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';
    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// Row description
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Frontend message type tags
pub mod frontend {
    /// Password, SASLInitialResponse and SASLResponse all share `p`
    pub const PASSWORD: u8 = b'p';
    /// Simple query
    pub const QUERY: u8 = b'Q';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Authentication request codes
pub mod auth {
    /// Authentication successful
    pub const OK: i32 = 0;
    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    /// MD5 password required
    pub const MD5_PASSWORD: i32 = 5;
    /// SASL mechanisms available (Postgres 10+)
    pub const SASL: i32 = 10;
    /// SASL server challenge
    pub const SASL_CONTINUE: i32 = 11;
    /// SASL server final message
    pub const SASL_FINAL: i32 = 12;
}

/// SASL mechanism name for SCRAM-SHA-256
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
