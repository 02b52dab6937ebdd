//! Connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@][host][:port][/database][?params]
//! * postgres:///database (Unix socket in the default directory)
//! * postgres:///database?host=/path/to/socket (Unix socket, custom directory)
//!
//! Recognised query parameters: `host`, `port`, `sslmode`, `sslrootcert`,
//! `application_name`. Unknown parameters are rejected.

use crate::connection::{ConnectionConfig, Credentials, SslMode, TlsConfig};
use crate::{Error, Result};
use std::path::Path;

const DEFAULT_PORT: u16 = 5432;

/// Parsed connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Host name, address, or Unix socket directory
    pub host: String,
    /// Port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// SSL/TLS mode
    pub sslmode: SslMode,
    /// Path to a custom CA certificate (`sslrootcert`)
    pub sslrootcert: Option<String>,
    /// `application_name` to report to the server
    pub application_name: Option<String>,
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sslmode", &self.sslmode)
            .field("sslrootcert", &self.sslrootcert)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl Default for ConnectionInfo {
    /// `localhost:5432`, OS user, database named after the user
    fn default() -> Self {
        let user = whoami::username();
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: user.clone(),
            user,
            password: None,
            sslmode: SslMode::default(),
            sslrootcert: None,
            application_name: None,
        }
    }
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    ["/run/postgresql", "/var/run/postgresql", "/tmp"]
        .into_iter()
        .find(|dir| Path::new(dir).is_dir())
        .map(str::to_string)
}

/// Decode `%XX` escapes (userinfo and database may be percent-encoded).
///
/// Every `%` must be followed by exactly two hex digits.
fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let well_formed = bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'%')
        .all(|(i, _)| {
            bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
        });
    if !well_formed {
        return Err(Error::Config(format!("invalid percent-encoding in '{}'", s)));
    }
    urlencoding::decode(s)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::Config(format!("percent-encoded value is not UTF-8: '{}'", s)))
}

impl ConnectionInfo {
    /// Parse a `postgres://` or `postgresql://` URL.
    ///
    /// Omitted parts fall back to port 5432 and the current OS user for
    /// both user and database.
    ///
    /// # Examples
    ///
    /// ```
    /// use pg_bootstrap::ConnectionInfo;
    ///
    /// let info = ConnectionInfo::parse("postgres://root:rootroot@db:5432/userinfo").unwrap();
    /// assert_eq!(info.host, "db");
    /// assert_eq!(info.database, "userinfo");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("postgres://")
            .or_else(|| s.strip_prefix("postgresql://"))
            .ok_or_else(|| Error::Config("connection string must start with postgres://".into()))?;

        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));

        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let mut info = Self::default();

        if let Some(auth) = auth {
            let (user, password) = match auth.split_once(':') {
                Some((user, password)) => (user, Some(password)),
                None => (auth, None),
            };
            if !user.is_empty() {
                info.user = percent_decode(user)?;
                info.database = info.user.clone();
            }
            info.password = password.map(percent_decode).transpose()?;
        }

        let (host_port, database) = rest.split_once('/').unwrap_or((rest, ""));
        if !database.is_empty() {
            info.database = percent_decode(database)?;
        }

        if host_port.is_empty() {
            info.host = String::new();
        } else if let Some(host) = host_port.strip_prefix('[') {
            // IPv6 literal: [::1]:5432
            let (addr, after) = host
                .split_once(']')
                .ok_or_else(|| Error::Config("unterminated IPv6 address".into()))?;
            info.host = addr.to_string();
            if let Some(port) = after.strip_prefix(':') {
                info.port = parse_port(port)?;
            } else if !after.is_empty() {
                return Err(Error::Config(format!("unexpected '{}' after IPv6 address", after)));
            }
        } else {
            match host_port.split_once(':') {
                Some((host, port)) => {
                    info.host = host.to_string();
                    info.port = parse_port(port)?;
                }
                None => info.host = host_port.to_string(),
            }
        }

        info.apply_query(query)?;

        if info.host.is_empty() {
            info.host = resolve_default_socket_dir().ok_or_else(|| {
                Error::Config(
                    "could not locate Unix socket directory. Set host query parameter explicitly."
                        .into(),
                )
            })?;
        }

        Ok(info)
    }

    fn apply_query(&mut self, query: &str) -> Result<()> {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("query parameter '{}' has no value", pair)))?;
            let value = percent_decode(value)?;
            match key {
                "host" => self.host = value,
                "port" => self.port = parse_port(&value)?,
                "sslmode" => self.sslmode = value.parse()?,
                "sslrootcert" => self.sslrootcert = Some(value),
                "application_name" => self.application_name = Some(value),
                other => {
                    return Err(Error::Config(format!(
                        "unsupported connection parameter '{}'",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    /// Convert to a [`ConnectionConfig`]
    pub fn to_config(&self) -> ConnectionConfig {
        let credentials = match &self.password {
            Some(password) => Credentials::with_password(&self.user, password),
            None => Credentials::new(&self.user),
        };
        let mut builder = ConnectionConfig::builder(&self.host, self.port, &self.database)
            .credentials(credentials)
            .sslmode(self.sslmode);
        if let Some(name) = &self.application_name {
            builder = builder.application_name(name);
        }
        builder.build()
    }

    /// TLS settings implied by `sslmode` and `sslrootcert`.
    ///
    /// `None` when `sslmode` is `disable`.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if self.sslmode == SslMode::Disable {
            return Ok(None);
        }
        let mut builder = TlsConfig::builder();
        if let Some(path) = &self.sslrootcert {
            builder = builder.ca_cert_path(path);
        }
        builder.build().map(Some)
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| Error::Config(format!("invalid port '{}'", s)))
}
