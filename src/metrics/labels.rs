//! Metric names and label values

/// Counter: connection attempts, labelled by `outcome`
pub const ATTEMPTS_TOTAL: &str = "pg_bootstrap_attempts_total";
/// Counter: bootstrap results, labelled by `result`
pub const RESULTS_TOTAL: &str = "pg_bootstrap_results_total";
/// Counter: failed attempts, labelled by error `category`
pub const FAILURES_TOTAL: &str = "pg_bootstrap_attempt_failures_total";
/// Counter: authentication exchanges, labelled by `mechanism` and `outcome`
pub const AUTH_TOTAL: &str = "pg_bootstrap_auth_total";
/// Histogram: duration of a single attempt in milliseconds
pub const ATTEMPT_DURATION_MS: &str = "pg_bootstrap_attempt_duration_ms";
/// Histogram: duration of a whole bootstrap in milliseconds
pub const TOTAL_DURATION_MS: &str = "pg_bootstrap_total_duration_ms";

/// Attempt succeeded
pub const OUTCOME_CONNECTED: &str = "connected";
/// Attempt failed, will be retried
pub const OUTCOME_TRANSIENT: &str = "transient";
/// Attempt failed and ends the bootstrap
pub const OUTCOME_FATAL: &str = "fatal";

/// Bootstrap returned a connection
pub const RESULT_CONNECTED: &str = "connected";
/// Credentials were rejected
pub const RESULT_AUTH_REJECTED: &str = "authentication_rejected";
/// Configuration was invalid
pub const RESULT_CONFIG_INVALID: &str = "configuration_invalid";
/// Retry budget ran out
pub const RESULT_EXHAUSTED: &str = "retry_budget_exhausted";
/// Caller cancelled
pub const RESULT_CANCELLED: &str = "cancelled";
/// Any other fatal error
pub const RESULT_FATAL: &str = "fatal";

/// Cleartext password authentication
pub const MECHANISM_CLEARTEXT: &str = "cleartext";
/// SCRAM-SHA-256 authentication
pub const MECHANISM_SCRAM: &str = "scram-sha-256";
/// MD5 password authentication (always refused by the client)
pub const MECHANISM_MD5: &str = "md5";
/// Server did not ask for a password (trust)
pub const MECHANISM_TRUST: &str = "trust";
