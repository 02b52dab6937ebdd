//! Bootstrap settings from JSON or the environment

use super::ConnectionInfo;
use crate::bootstrap::RetryPolicy;
use crate::connection::{ConnectionConfig, TlsConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

mod defaults {
    pub const fn max_attempts() -> u32 {
        10
    }

    pub const fn backoff_ms() -> u64 {
        1_000
    }

    pub const fn attempt_timeout_ms() -> u64 {
        5_000
    }

    pub const fn backoff_multiplier() -> f64 {
        1.0
    }
}

/// Connection parameters plus retry policy, as loaded from outside.
///
/// `url` is applied first; discrete fields override the matching part of it.
///
/// ```
/// use pg_bootstrap::BootstrapSettings;
///
/// let settings = BootstrapSettings::from_json(r#"{
///     "host": "db",
///     "user": "root",
///     "password": "rootroot",
///     "database": "userinfo",
///     "max_attempts": 3
/// }"#).unwrap();
/// let (config, policy) = settings.into_parts().unwrap();
/// assert_eq!(config.host(), "db");
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSettings {
    /// `postgres://` URL
    #[serde(default)]
    pub url: Option<String>,
    /// Host name, address, or Unix socket directory
    #[serde(default)]
    pub host: Option<String>,
    /// Port
    #[serde(default)]
    pub port: Option<u16>,
    /// Username
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// `disable`, `prefer` or `require`
    #[serde(default)]
    pub sslmode: Option<String>,
    /// Custom CA certificate file
    #[serde(default)]
    pub sslrootcert: Option<String>,
    /// `application_name` to report
    #[serde(default)]
    pub application_name: Option<String>,

    /// Total number of attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts, in milliseconds
    #[serde(default = "defaults::backoff_ms")]
    pub backoff_ms: u64,
    /// Time budget for a single attempt, in milliseconds
    #[serde(default = "defaults::attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Growth factor for the wait
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Cap on a single wait, in milliseconds
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            sslmode: None,
            sslrootcert: None,
            application_name: None,
            max_attempts: defaults::max_attempts(),
            backoff_ms: defaults::backoff_ms(),
            attempt_timeout_ms: defaults::attempt_timeout_ms(),
            backoff_multiplier: defaults::backoff_multiplier(),
            max_backoff_ms: None,
        }
    }
}

impl std::fmt::Debug for BootstrapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapSettings")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("sslmode", &self.sslmode)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_ms", &self.backoff_ms)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl BootstrapSettings {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid settings: {}", e)))
    }

    /// Read libpq-style variables from the process environment.
    ///
    /// `DATABASE_URL`, `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`,
    /// `PGDATABASE`, `PGSSLMODE`, `PGSSLROOTCERT`, `PGAPPNAME`, plus
    /// `BOOTSTRAP_MAX_ATTEMPTS`, `BOOTSTRAP_BACKOFF_MS` and
    /// `BOOTSTRAP_ATTEMPT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self {
            url: lookup("DATABASE_URL"),
            host: lookup("PGHOST"),
            port: lookup("PGPORT").map(|v| parse_var("PGPORT", &v)).transpose()?,
            user: lookup("PGUSER"),
            password: lookup("PGPASSWORD"),
            database: lookup("PGDATABASE"),
            sslmode: lookup("PGSSLMODE"),
            sslrootcert: lookup("PGSSLROOTCERT"),
            application_name: lookup("PGAPPNAME"),
            ..Self::default()
        };

        if let Some(v) = lookup("BOOTSTRAP_MAX_ATTEMPTS") {
            settings.max_attempts = parse_var("BOOTSTRAP_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("BOOTSTRAP_BACKOFF_MS") {
            settings.backoff_ms = parse_var("BOOTSTRAP_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("BOOTSTRAP_ATTEMPT_TIMEOUT_MS") {
            settings.attempt_timeout_ms = parse_var("BOOTSTRAP_ATTEMPT_TIMEOUT_MS", &v)?;
        }
        Ok(settings)
    }

    fn connection_info(&self) -> Result<ConnectionInfo> {
        let mut info = match &self.url {
            Some(url) => ConnectionInfo::parse(url)?,
            None => ConnectionInfo::default(),
        };

        if let Some(host) = &self.host {
            info.host = host.clone();
        }
        if let Some(port) = self.port {
            info.port = port;
        }
        if let Some(user) = &self.user {
            info.user = user.clone();
            if self.url.is_none() && self.database.is_none() {
                info.database = user.clone();
            }
        }
        if let Some(password) = &self.password {
            info.password = Some(password.clone());
        }
        if let Some(database) = &self.database {
            info.database = database.clone();
        }
        if let Some(mode) = &self.sslmode {
            info.sslmode = mode.parse()?;
        }
        if let Some(path) = &self.sslrootcert {
            info.sslrootcert = Some(path.clone());
        }
        if let Some(name) = &self.application_name {
            info.application_name = Some(name.clone());
        }
        Ok(info)
    }

    /// Retry policy described by these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut builder = RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .backoff_interval(Duration::from_millis(self.backoff_ms))
            .attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
            .backoff_multiplier(self.backoff_multiplier);
        if let Some(cap) = self.max_backoff_ms {
            builder = builder.max_backoff(Duration::from_millis(cap));
        }
        builder.build()
    }

    /// TLS settings, `None` when `sslmode` is `disable`
    pub fn tls_config(&self) -> Result<Option<TlsConfig>> {
        self.connection_info()?.to_tls_config()
    }

    /// Split into explicit connection parameters and a validated policy
    pub fn into_parts(self) -> Result<(ConnectionConfig, RetryPolicy)> {
        let config = self.connection_info()?.to_config();
        let policy = self.retry_policy();
        config.validate()?;
        policy.validate()?;
        Ok((config, policy))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", key, value)))
}
