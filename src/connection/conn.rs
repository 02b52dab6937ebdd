//! Connection configuration and the live connection handle

use super::state::ConnectionState;
use super::tls::{SslMode, TlsConfig};
use super::transport::Transport;
use crate::auth::ScramSha256;
use crate::bootstrap::FailureClass;
use crate::metrics::{counters, labels};
use crate::protocol::constants::{PROTOCOL_VERSION, SCRAM_SHA_256};
use crate::protocol::{
    decode_message, encode_into, AuthenticationMessage, BackendMessage, FrontendMessage,
};
use crate::{Error, Result, ServerError};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// Login credentials. Passed through to the server untouched; `Debug`
/// never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: Option<String>,
}

impl Credentials {
    /// User without a password (trust or peer authentication)
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: None,
        }
    }

    /// User with a password
    pub fn with_password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Some(password.into()),
        }
    }

    /// User name
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password, if any
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where and how to connect. Immutable once built.
///
/// A `host` beginning with `/` is a Unix socket directory, as in libpq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    credentials: Credentials,
    database: String,
    application_name: Option<String>,
    params: Vec<(String, String)>,
    sslmode: SslMode,
}

impl ConnectionConfig {
    /// Configuration with no optional settings
    pub fn new(
        host: impl Into<String>,
        port: u16,
        credentials: Credentials,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            database: database.into(),
            application_name: None,
            params: Vec::new(),
            sslmode: SslMode::default(),
        }
    }

    /// Builder; the user defaults to the current OS user
    ///
    /// # Examples
    ///
    /// ```
    /// use pg_bootstrap::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::builder("db", 5432, "userinfo")
    ///     .user("root")
    ///     .password("rootroot")
    ///     .application_name("names-demo")
    ///     .build();
    /// assert_eq!(config.credentials().user(), "root");
    /// ```
    pub fn builder(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::new(host, port, Credentials::new(whoami::username()), database),
        }
    }

    /// Host name, address or Unix socket directory
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port (also selects the Unix socket file)
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// `application_name` reported to the server
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    /// Extra startup parameters
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// TLS mode
    pub fn sslmode(&self) -> SslMode {
        self.sslmode
    }

    /// Unix socket path when `host` names a directory
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.host
            .starts_with('/')
            .then(|| PathBuf::from(format!("{}/.s.PGSQL.{}", self.host, self.port)))
    }

    /// Presence checks only; nothing is resolved or contacted.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".into()));
        }
        if self.credentials.user.is_empty() {
            return Err(Error::Config("user must not be empty".into()));
        }
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".into()));
        }
        if self.sslmode == SslMode::Require && self.socket_path().is_some() {
            return Err(Error::Config(format!(
                "sslmode={} is not supported over a Unix socket",
                self.sslmode
            )));
        }
        Ok(())
    }

    fn startup_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), self.credentials.user.clone()),
            ("database".to_string(), self.database.clone()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ];
        if let Some(name) = &self.application_name {
            params.push(("application_name".to_string(), name.clone()));
        }
        params.extend(self.params.iter().cloned());
        params
    }
}

/// Builder for [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the user, keeping any password already set
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.credentials.user = user.into();
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.credentials.password = Some(password.into());
        self
    }

    /// Replace the credentials
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Set `application_name`
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = Some(name.into());
        self
    }

    /// Add a startup parameter (e.g. `search_path`)
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.push((key.into(), value.into()));
        self
    }

    /// Set the TLS mode
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.config.sslmode = mode;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Row returned by [`Connection::simple_query`]; values are in text format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleQueryRow {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl SimpleQueryRow {
    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value by position; `None` for NULL or out of range
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx)?.as_deref()
    }

    /// Value by column name
    pub fn get_named(&self, name: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.get(idx)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Message produced by [`Connection::simple_query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleQueryMessage {
    /// A result row
    Row(SimpleQueryRow),
    /// A statement finished; carries the command tag (e.g. `INSERT 0 1`)
    CommandComplete(String),
}

/// A fully started Postgres session.
///
/// Only handed out after the server sent `ReadyForQuery`. Dropping it closes
/// the socket; [`Connection::close`] also says goodbye to the server.
#[derive(Debug)]
pub struct Connection {
    transport: Transport,
    state: ConnectionState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    process_id: Option<i32>,
    secret_key: Option<i32>,
    parameters: HashMap<String, String>,
}

impl Connection {
    /// Open a transport and perform the full startup handshake.
    ///
    /// `tls` is only consulted when `config.sslmode()` is not `disable`; the
    /// platform trust store is used when it is `None`.
    pub async fn connect(config: &ConnectionConfig, tls: Option<&TlsConfig>) -> Result<Self> {
        async {
            let transport = match config.socket_path() {
                Some(path) => Transport::connect_unix(&path).await?,
                None => Transport::connect_tcp(&config.host, config.port).await?,
            };
            let mut conn = Self::new(transport);

            if config.sslmode != SslMode::Disable && conn.transport.is_plain_tcp() {
                conn = conn.negotiate_tls(config, tls).await?;
            }

            conn.startup(config).await?;
            Ok(conn)
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %config.credentials.user,
            database = %config.database
        ))
        .await
    }

    fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(256),
            process_id: None,
            secret_key: None,
            parameters: HashMap::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Backend process ID reported in BackendKeyData
    pub fn process_id(&self) -> Option<i32> {
        self.process_id
    }

    /// Secret key reported in BackendKeyData, needed for CancelRequest
    pub fn secret_key(&self) -> Option<i32> {
        self.secret_key
    }

    /// Whether the session is encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Run-time parameter reported by the server (e.g. `server_version`)
    pub fn server_parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    async fn negotiate_tls(
        mut self,
        config: &ConnectionConfig,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        self.state.transition(ConnectionState::NegotiatingTls)?;
        self.send(&FrontendMessage::SslRequest).await?;

        match self.transport.read_u8().await? {
            b'S' => {
                let owned;
                let tls = match tls {
                    Some(tls) => tls,
                    None => {
                        owned = TlsConfig::builder().build()?;
                        &owned
                    }
                };
                self.transport = self.transport.upgrade_to_tls(tls, &config.host).await?;
                tracing::debug!("TLS established");
                Ok(self)
            }
            b'N' if config.sslmode == SslMode::Prefer => {
                tracing::debug!("server refused TLS, continuing in plaintext");
                Ok(self)
            }
            b'N' => Err(Error::Tls(format!(
                "server does not support TLS (sslmode={})",
                config.sslmode
            ))),
            other => Err(Error::Protocol(format!(
                "unexpected SSLRequest response byte: 0x{:02X}",
                other
            ))),
        }
    }

    async fn startup(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.state.transition(ConnectionState::AwaitingAuth)?;
        self.send(&FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params: config.startup_params(),
        })
        .await?;

        self.state.transition(ConnectionState::Authenticating)?;
        self.authenticate(config).await?;

        self.state.transition(ConnectionState::Ready)?;
        tracing::debug!(
            process_id = ?self.process_id,
            server_version = ?self.server_parameter("server_version"),
            "startup complete"
        );
        Ok(())
    }

    async fn authenticate(&mut self, config: &ConnectionConfig) -> Result<()> {
        let mut mechanism = labels::MECHANISM_TRUST;
        let result = self.auth_exchange(config, &mut mechanism).await;
        if let Err(err) = &result {
            if err.classify() == FailureClass::AuthenticationRejected {
                counters::auth(mechanism, "rejected");
            }
        }
        result
    }

    /// Authentication loop, through to ReadyForQuery
    async fn auth_exchange(
        &mut self,
        config: &ConnectionConfig,
        mechanism: &mut &'static str,
    ) -> Result<()> {
        loop {
            match self.receive().await? {
                BackendMessage::Authentication(AuthenticationMessage::Ok) => {
                    counters::auth(*mechanism, "ok");
                }
                BackendMessage::Authentication(AuthenticationMessage::CleartextPassword) => {
                    *mechanism = labels::MECHANISM_CLEARTEXT;
                    let password = required_password(config)?;
                    self.send(&FrontendMessage::Password(password.to_string()))
                        .await?;
                }
                BackendMessage::Authentication(AuthenticationMessage::Md5Password { .. }) => {
                    *mechanism = labels::MECHANISM_MD5;
                    return Err(Error::Authentication(
                        "MD5 password authentication is not supported, use scram-sha-256".into(),
                    ));
                }
                BackendMessage::Authentication(AuthenticationMessage::Sasl { mechanisms }) => {
                    *mechanism = labels::MECHANISM_SCRAM;
                    self.scram(&mechanisms, config).await?;
                }
                BackendMessage::Authentication(other) => {
                    return Err(Error::Protocol(format!(
                        "unexpected {:?} outside of a SASL exchange",
                        other
                    )));
                }
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.process_id = Some(process_id);
                    self.secret_key = Some(secret_key);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!("notice during startup: {}", notice);
                }
                BackendMessage::ReadyForQuery { .. } => return Ok(()),
                BackendMessage::ErrorResponse(fields) => {
                    return Err(Error::Server(ServerError::from(fields)));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message during startup: {:?}",
                        other
                    )));
                }
            }
        }
    }

    async fn scram(&mut self, mechanisms: &[String], config: &ConnectionConfig) -> Result<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
            return Err(Error::Authentication(format!(
                "server offers no supported SASL mechanism ({})",
                mechanisms.join(", ")
            )));
        }
        let mut scram = ScramSha256::new(required_password(config)?);

        self.send(&FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256.to_string(),
            data: scram.client_first(),
        })
        .await?;

        let server_first = match self.receive().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(fields) => return Err(Error::Server(fields.into())),
            other => {
                return Err(Error::Protocol(format!(
                    "expected SASLContinue, got {:?}",
                    other
                )))
            }
        };
        // PBKDF2 is CPU-bound and the iteration count is server-chosen
        let (mut scram, client_final) = tokio::task::spawn_blocking(move || {
            let client_final = scram.handle_server_first(&server_first);
            (scram, client_final)
        })
        .await
        .map_err(|e| Error::Protocol(format!("SCRAM key derivation failed: {}", e)))?;
        let client_final = client_final?;
        self.send(&FrontendMessage::SaslResponse(client_final))
            .await?;

        let server_final = match self.receive().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => data,
            BackendMessage::ErrorResponse(fields) => return Err(Error::Server(fields.into())),
            other => {
                return Err(Error::Protocol(format!(
                    "expected SASLFinal, got {:?}",
                    other
                )))
            }
        };
        Ok(scram.verify_server_final(&server_final)?)
    }

    /// Run a simple-protocol query and collect every row and command tag.
    ///
    /// A server error is returned after the server is ready again, so the
    /// connection stays usable.
    pub async fn simple_query(&mut self, sql: &str) -> Result<Vec<SimpleQueryMessage>> {
        if self.state != ConnectionState::Ready {
            return Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.state.transition(ConnectionState::Querying)?;
        self.send(&FrontendMessage::Query(sql.to_string())).await?;

        let mut out = Vec::new();
        let mut columns: Arc<[String]> = Arc::from(Vec::new());
        let mut failure = None;

        loop {
            match self.receive().await? {
                BackendMessage::RowDescription(names) => columns = names.into(),
                BackendMessage::DataRow(values) => {
                    let values = values
                        .into_iter()
                        .map(|v| v.map(|b| String::from_utf8_lossy(&b).into_owned()))
                        .collect();
                    out.push(SimpleQueryMessage::Row(SimpleQueryRow {
                        columns: Arc::clone(&columns),
                        values,
                    }));
                }
                BackendMessage::CommandComplete(tag) => {
                    out.push(SimpleQueryMessage::CommandComplete(tag));
                }
                BackendMessage::ErrorResponse(fields) => failure = Some(ServerError::from(fields)),
                BackendMessage::EmptyQueryResponse => {}
                BackendMessage::NoticeResponse(notice) => tracing::debug!("notice: {}", notice),
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery { .. } => break,
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message in query response: {:?}",
                        other
                    )));
                }
            }
        }

        self.state.transition(ConnectionState::Ready)?;
        match failure {
            Some(err) => Err(Error::Server(err)),
            None => Ok(out),
        }
    }

    /// Readiness probe: `SELECT 1`
    pub async fn ping(&mut self) -> Result<()> {
        self.simple_query("SELECT 1").await.map(|_| ())
    }

    /// Send Terminate and shut the transport down
    pub async fn close(mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closed)?;
        // the server may already be gone; shutdown below reports real failures
        let _ = self.send(&FrontendMessage::Terminate).await;
        self.transport.shutdown().await
    }

    async fn send(&mut self, msg: &FrontendMessage) -> Result<()> {
        self.write_buf.clear();
        encode_into(&mut self.write_buf, msg);
        self.transport.send(&self.write_buf).await
    }

    async fn receive(&mut self) -> Result<BackendMessage> {
        loop {
            let decoded =
                decode_message(&self.read_buf).map_err(|e| Error::Protocol(e.to_string()))?;
            if let Some((msg, consumed)) = decoded {
                self.read_buf.advance(consumed);
                return Ok(msg);
            }
            if self.transport.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

fn required_password(config: &ConnectionConfig) -> Result<&str> {
    config
        .credentials
        .password()
        .ok_or_else(|| Error::Authentication("server requested a password but none is set".into()))
}

/// Quote a string as an SQL literal (`standard_conforming_strings` on)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
