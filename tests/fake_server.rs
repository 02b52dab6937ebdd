//! Bootstrap against an in-process server speaking just enough of the
//! Postgres startup protocol.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{BufMut, BytesMut};
use hmac::{Hmac, Mac};
use pg_bootstrap::{
    connect, with_connection, ConnectionConfig, ConnectionState, Error, FailureClass,
    RetryPolicy, SimpleQueryMessage, SslMode,
};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const PASSWORD: &str = "rootroot";
const SSL_REQUEST_CODE: i32 = 80877103;
const SALT: &[u8] = b"fake-server-salt";

/// What the server does with one incoming connection
#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Reply 57P03 to the startup message
    StartingUp,
    /// Ask for a password, then reject it with 28P01
    BadPassword,
    /// Reply 3D000 to the startup message
    NoDatabase,
    /// Full startup, then answer queries until Terminate
    Ready,
    /// Ask for an MD5 password
    Md5,
    /// SCRAM-SHA-256 exchange, then as `Ready`
    Scram,
    /// SCRAM-SHA-256 with an unreasonable iteration count
    ScramCostly,
}

/// Something the server observed, reported back to the test
#[derive(Debug, PartialEq)]
enum Event {
    SslRequest,
    Startup { user: String, database: String },
    Query(String),
    Terminate,
}

fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(body.len() + 5);
    buf.put_u8(tag);
    buf.put_i32(body.len() as i32 + 4);
    buf.put_slice(body);
    buf.to_vec()
}

fn error_response(code: &str, text: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    for (field, value) in [(b'S', "FATAL"), (b'V', "FATAL"), (b'C', code), (b'M', text)] {
        body.put_u8(field);
        body.put_slice(value.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);
    message(b'E', &body)
}

fn auth(code: i32) -> Vec<u8> {
    message(b'R', &code.to_be_bytes())
}

fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_slice(name.as_bytes());
    body.put_u8(0);
    body.put_slice(value.as_bytes());
    body.put_u8(0);
    message(b'S', &body)
}

fn backend_key_data(pid: i32, key: i32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32(pid);
    body.put_i32(key);
    message(b'K', &body)
}

fn ready_for_query() -> Vec<u8> {
    message(b'Z', b"I")
}

fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = tag.as_bytes().to_vec();
    body.push(0);
    message(b'C', &body)
}

fn row_description(columns: &[&str]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i16(columns.len() as i16);
    for name in columns {
        body.put_slice(name.as_bytes());
        body.put_u8(0);
        body.put_i32(0); // table oid
        body.put_i16(0); // column number
        body.put_i32(25); // text
        body.put_i16(-1);
        body.put_i32(-1);
        body.put_i16(0);
    }
    message(b'T', &body)
}

fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i16(values.len() as i16);
    for value in values {
        match value {
            Some(v) => {
                body.put_i32(v.len() as i32);
                body.put_slice(v.as_bytes());
            }
            None => body.put_i32(-1),
        }
    }
    message(b'D', &body)
}

fn cstrings(body: &[u8]) -> Vec<String> {
    body.split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Read the startup message, refusing any SSLRequest that precedes it
async fn read_startup(
    socket: &mut TcpStream,
    events: &mpsc::UnboundedSender<Event>,
) -> std::io::Result<(String, String)> {
    loop {
        let len = socket.read_i32().await? as usize;
        let mut body = vec![0u8; len - 4];
        socket.read_exact(&mut body).await?;
        if body[..4] == SSL_REQUEST_CODE.to_be_bytes() {
            let _ = events.send(Event::SslRequest);
            socket.write_all(b"N").await?;
            continue;
        }
        // skip the protocol version
        let pairs = cstrings(&body[4..]);
        let lookup = |key: &str| {
            pairs
                .chunks(2)
                .find(|kv| kv[0] == key)
                .and_then(|kv| kv.get(1).cloned())
                .unwrap_or_default()
        };
        return Ok((lookup("user"), lookup("database")));
    }
}

async fn read_message(socket: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let tag = socket.read_u8().await?;
    let len = socket.read_i32().await? as usize;
    let mut body = vec![0u8; len - 4];
    socket.read_exact(&mut body).await?;
    Ok((tag, body))
}

async fn serve(
    mut socket: TcpStream,
    behavior: Behavior,
    events: mpsc::UnboundedSender<Event>,
) -> std::io::Result<()> {
    let (user, database) = read_startup(&mut socket, &events).await?;
    let _ = events.send(Event::Startup { user, database });

    match behavior {
        Behavior::StartingUp => {
            socket
                .write_all(&error_response("57P03", "the database system is starting up"))
                .await?;
            return Ok(());
        }
        Behavior::NoDatabase => {
            socket
                .write_all(&error_response("3D000", "database \"userinfo\" does not exist"))
                .await?;
            return Ok(());
        }
        Behavior::Md5 => {
            let mut body = 5i32.to_be_bytes().to_vec();
            body.extend_from_slice(b"salt");
            socket.write_all(&message(b'R', &body)).await?;
            // the client hangs up without answering
            let _ = socket.read_u8().await;
            return Ok(());
        }
        Behavior::BadPassword | Behavior::Ready | Behavior::Scram | Behavior::ScramCostly => {}
    }

    let authenticated = match behavior {
        Behavior::Scram => scram_exchange(&mut socket, 4096).await?,
        Behavior::ScramCostly => scram_exchange(&mut socket, 20_000_000).await?,
        _ => cleartext_exchange(&mut socket, behavior).await?,
    };
    if !authenticated {
        socket
            .write_all(&error_response(
                "28P01",
                "password authentication failed for user \"root\"",
            ))
            .await?;
        return Ok(());
    }

    let mut startup = auth(0);
    startup.extend(parameter_status("server_version", "16.2"));
    startup.extend(parameter_status("client_encoding", "UTF8"));
    startup.extend(backend_key_data(4242, 99));
    startup.extend(ready_for_query());
    socket.write_all(&startup).await?;

    loop {
        let (tag, body) = read_message(&mut socket).await?;
        match tag {
            b'Q' => {
                let sql = cstrings(&body).into_iter().next().unwrap_or_default();
                let _ = events.send(Event::Query(sql.clone()));
                let mut reply = Vec::new();
                if sql == "SELECT 1" {
                    reply.extend(row_description(&["?column?"]));
                    reply.extend(data_row(&[Some("1")]));
                    reply.extend(command_complete("SELECT 1"));
                } else if sql.starts_with("SELECT name") {
                    reply.extend(row_description(&["name"]));
                    reply.extend(data_row(&[Some("Khushi")]));
                    reply.extend(data_row(&[Some("Alice")]));
                    reply.extend(data_row(&[None]));
                    reply.extend(command_complete("SELECT 3"));
                } else if sql.starts_with("SELECT * FROM missing") {
                    reply.extend(error_response("42P01", "relation \"missing\" does not exist"));
                } else {
                    reply.extend(command_complete("INSERT 0 1"));
                }
                reply.extend(ready_for_query());
                socket.write_all(&reply).await?;
            }
            b'X' => {
                let _ = events.send(Event::Terminate);
                return Ok(());
            }
            other => panic!("unexpected frontend message 0x{:02X}", other),
        }
    }
}

async fn cleartext_exchange(socket: &mut TcpStream, behavior: Behavior) -> std::io::Result<bool> {
    socket.write_all(&auth(3)).await?;
    let (tag, body) = read_message(socket).await?;
    assert_eq!(tag, b'p');
    let password_ok = cstrings(&body).first().map(String::as_str) == Some(PASSWORD);
    Ok(password_ok && !matches!(behavior, Behavior::BadPassword))
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Server side of SCRAM-SHA-256; `Ok(false)` when the proof is wrong
async fn scram_exchange(socket: &mut TcpStream, iterations: u32) -> std::io::Result<bool> {
    let mut offer = 10i32.to_be_bytes().to_vec();
    offer.extend_from_slice(b"SCRAM-SHA-256\0\0");
    socket.write_all(&message(b'R', &offer)).await?;

    // SASLInitialResponse: mechanism, length, client-first-message
    let (tag, body) = read_message(socket).await?;
    assert_eq!(tag, b'p');
    let nul = body.iter().position(|b| *b == 0).unwrap();
    assert_eq!(&body[..nul], b"SCRAM-SHA-256");
    let client_first = String::from_utf8(body[nul + 5..].to_vec()).unwrap();
    let client_first_bare = client_first.strip_prefix("n,,").unwrap().to_string();
    let client_nonce = client_first_bare.strip_prefix("n=,r=").unwrap();

    let server_first = format!(
        "r={}fakeserver,s={},i={}",
        client_nonce,
        BASE64.encode(SALT),
        iterations
    );
    let mut reply = 11i32.to_be_bytes().to_vec();
    reply.extend_from_slice(server_first.as_bytes());
    socket.write_all(&message(b'R', &reply)).await?;

    let (tag, body) = read_message(socket).await?;
    assert_eq!(tag, b'p');
    let client_final = String::from_utf8(body).unwrap();
    let (without_proof, proof) = client_final.rsplit_once(",p=").unwrap();

    let mut salted = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(PASSWORD.as_bytes(), SALT, iterations, &mut salted).unwrap();
    let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);
    let client_key = hmac(&salted, b"Client Key");
    let stored_key = Sha256::digest(&client_key);
    let signature = hmac(&stored_key, auth_message.as_bytes());
    let expected: Vec<u8> = client_key
        .iter()
        .zip(&signature)
        .map(|(k, s)| k ^ s)
        .collect();
    if BASE64.decode(proof).ok() != Some(expected) {
        return Ok(false);
    }

    let server_signature = hmac(&hmac(&salted, b"Server Key"), auth_message.as_bytes());
    let mut done = 12i32.to_be_bytes().to_vec();
    done.extend_from_slice(format!("v={}", BASE64.encode(server_signature)).as_bytes());
    socket.write_all(&message(b'R', &done)).await?;
    Ok(true)
}

/// Start a server that handles successive connections per `script`.
/// Connections beyond the script get `Ready`.
async fn spawn_server(script: Vec<Behavior>) -> (u16, mpsc::UnboundedReceiver<Event>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut script = script.into_iter();
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let behavior = script.next().unwrap_or(Behavior::Ready);
            let events = tx.clone();
            tokio::spawn(async move {
                let _ = serve(socket, behavior, events).await;
            });
        }
    });

    (port, rx)
}

fn config(port: u16, password: &str) -> ConnectionConfig {
    ConnectionConfig::builder("127.0.0.1", port, "userinfo")
        .user("root")
        .password(password)
        .application_name("fake-server-test")
        .build()
}

fn config_without_password(port: u16) -> ConnectionConfig {
    ConnectionConfig::builder("127.0.0.1", port, "userinfo")
        .user("root")
        .build()
}

fn config_with_sslmode(port: u16, mode: SslMode) -> ConnectionConfig {
    ConnectionConfig::builder("127.0.0.1", port, "userinfo")
        .user("root")
        .password(PASSWORD)
        .sslmode(mode)
        .build()
}

fn startups(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::Startup { .. }))
        .count()
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff_interval(Duration::from_millis(20))
        .attempt_timeout(Duration::from_secs(2))
        .build()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connects_once_ready() {
    let (port, mut events) = spawn_server(vec![Behavior::Ready]).await;

    let mut conn = assert_ok!(connect(&config(port, PASSWORD), &fast_policy(3)).await);
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.process_id(), Some(4242));
    assert_eq!(conn.server_parameter("server_version"), Some("16.2"));
    assert!(!conn.is_tls());

    assert_ok!(conn.ping().await);
    assert_ok!(conn.close().await);

    assert_eq!(
        events.recv().await,
        Some(Event::Startup {
            user: "root".into(),
            database: "userinfo".into()
        })
    );
    assert_eq!(events.recv().await, Some(Event::Query("SELECT 1".into())));
    assert_eq!(events.recv().await, Some(Event::Terminate));
}

#[tokio::test]
async fn test_retries_while_starting_up() {
    let (port, mut events) =
        spawn_server(vec![Behavior::StartingUp, Behavior::StartingUp, Behavior::Ready]).await;
    let started = Instant::now();

    let conn = assert_ok!(connect(&config(port, PASSWORD), &fast_policy(5)).await);
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_ok!(conn.close().await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(startups(&drain(&mut events)), 3);
}

#[tokio::test]
async fn test_starting_up_forever_exhausts_budget() {
    let (port, _events) = spawn_server(vec![Behavior::StartingUp; 3]).await;

    let err = assert_err!(connect(&config(port, PASSWORD), &fast_policy(3)).await);
    match err {
        Error::RetryBudgetExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.sqlstate(), Some("57P03"));
        }
        other => panic!("expected RetryBudgetExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_password_is_not_retried() {
    let (port, mut events) = spawn_server(vec![Behavior::BadPassword]).await;

    let err = assert_err!(connect(&config(port, "wrong"), &fast_policy(5)).await);
    assert_eq!(err.classify(), FailureClass::AuthenticationRejected);
    assert_eq!(err.sqlstate(), Some("28P01"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(drain(&mut events).len(), 1);
}

#[tokio::test]
async fn test_missing_database_is_fatal() {
    let (port, _events) = spawn_server(vec![Behavior::NoDatabase]).await;

    let err = assert_err!(connect(&config(port, PASSWORD), &fast_policy(5)).await);
    assert_eq!(err.classify(), FailureClass::Fatal);
    assert_eq!(err.sqlstate(), Some("3D000"));
}

#[tokio::test]
async fn test_connection_refused_exhausts_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let started = Instant::now();
    let err = assert_err!(connect(&config(port, PASSWORD), &fast_policy(3)).await);
    assert!(started.elapsed() >= Duration::from_millis(40));
    match err {
        Error::RetryBudgetExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, Error::Io(_)));
        }
        other => panic!("expected RetryBudgetExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_with_connection_closes_after_success() {
    let (port, mut events) = spawn_server(vec![]).await;

    let names = assert_ok!(
        with_connection(&config(port, PASSWORD), &fast_policy(3), |conn| {
            Box::pin(async move {
                conn.simple_query("INSERT INTO names (name) VALUES ('Alice')")
                    .await?;
                let rows = conn.simple_query("SELECT name FROM names").await?;
                Ok(rows
                    .into_iter()
                    .filter_map(|m| match m {
                        SimpleQueryMessage::Row(row) => Some(row.get(0).map(str::to_owned)),
                        SimpleQueryMessage::CommandComplete(_) => None,
                    })
                    .collect::<Vec<_>>())
            })
        })
        .await
    );
    assert_eq!(
        names,
        vec![Some("Khushi".to_string()), Some("Alice".to_string()), None]
    );

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = event == Event::Terminate;
        seen.push(event);
        if done {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&Event::Terminate));
}

#[tokio::test]
async fn test_with_connection_closes_after_error() {
    let (port, mut events) = spawn_server(vec![]).await;

    let err = assert_err!(
        with_connection(&config(port, PASSWORD), &fast_policy(3), |conn| {
            Box::pin(async move {
                conn.simple_query("SELECT * FROM missing").await?;
                Ok(())
            })
        })
        .await
    );
    assert_eq!(err.sqlstate(), Some("42P01"));

    let mut terminated = false;
    while let Some(event) = events.recv().await {
        if event == Event::Terminate {
            terminated = true;
            break;
        }
    }
    assert!(terminated);
}

#[tokio::test]
async fn test_server_error_leaves_connection_usable() {
    let (port, _events) = spawn_server(vec![]).await;
    let mut conn = assert_ok!(connect(&config(port, PASSWORD), &fast_policy(1)).await);

    assert_err!(conn.simple_query("SELECT * FROM missing").await);
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_ok!(conn.ping().await);
    assert_ok!(conn.close().await);
}

#[tokio::test]
async fn test_prefer_falls_back_to_plaintext() {
    let (port, mut events) = spawn_server(vec![Behavior::Ready]).await;

    let config = config_with_sslmode(port, SslMode::Prefer);
    let conn = assert_ok!(connect(&config, &fast_policy(1)).await);
    assert!(!conn.is_tls());
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_ok!(conn.close().await);

    assert_eq!(events.recv().await, Some(Event::SslRequest));
    assert!(matches!(events.recv().await, Some(Event::Startup { .. })));
}

#[tokio::test]
async fn test_require_fails_when_server_refuses_tls() {
    let (port, mut events) = spawn_server(vec![Behavior::Ready; 3]).await;

    let config = config_with_sslmode(port, SslMode::Require);
    let err = assert_err!(connect(&config, &fast_policy(3)).await);
    assert!(matches!(err, Error::Tls(_)));
    assert_eq!(err.classify(), FailureClass::Fatal);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(drain(&mut events), vec![Event::SslRequest]);
}

#[tokio::test]
async fn test_scram_authentication() {
    let (port, mut events) = spawn_server(vec![Behavior::Scram]).await;

    let mut conn = assert_ok!(connect(&config(port, PASSWORD), &fast_policy(1)).await);
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.secret_key(), Some(99));
    assert_ok!(conn.ping().await);
    assert_ok!(conn.close().await);

    assert!(matches!(events.recv().await, Some(Event::Startup { .. })));
    assert_eq!(events.recv().await, Some(Event::Query("SELECT 1".into())));
}

#[tokio::test]
async fn test_scram_wrong_password_is_not_retried() {
    let (port, mut events) = spawn_server(vec![Behavior::Scram; 3]).await;

    let err = assert_err!(connect(&config(port, "wrong"), &fast_policy(3)).await);
    assert_eq!(err.classify(), FailureClass::AuthenticationRejected);
    assert_eq!(err.sqlstate(), Some("28P01"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(startups(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_scram_excessive_iterations_fail_fast() {
    let (port, mut events) = spawn_server(vec![Behavior::ScramCostly; 3]).await;
    let started = Instant::now();

    let err = assert_err!(connect(&config(port, PASSWORD), &fast_policy(3)).await);
    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(err.classify(), FailureClass::Fatal);
    assert!(started.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(startups(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_md5_request_is_rejected_without_retry() {
    let (port, mut events) = spawn_server(vec![Behavior::Md5; 3]).await;

    let err = assert_err!(connect(&config(port, PASSWORD), &fast_policy(3)).await);
    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(err.classify(), FailureClass::AuthenticationRejected);
    assert_eq!(err.sqlstate(), None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(startups(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_missing_password_is_rejected_without_retry() {
    let (port, mut events) = spawn_server(vec![Behavior::Ready; 3]).await;

    let err = assert_err!(connect(&config_without_password(port), &fast_policy(3)).await);
    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(err.classify(), FailureClass::AuthenticationRejected);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(startups(&drain(&mut events)), 1);
}

/// Collects `(mechanism, outcome)` for every authentication counter increment
#[derive(Default)]
struct AuthRecorder {
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

struct AuthCounter {
    labels: (String, String),
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

impl metrics::CounterFn for AuthCounter {
    fn increment(&self, _value: u64) {
        self.seen.lock().unwrap().push(self.labels.clone());
    }

    fn absolute(&self, _value: u64) {}
}

impl metrics::Recorder for AuthRecorder {
    fn describe_counter(
        &self,
        _: metrics::KeyName,
        _: Option<metrics::Unit>,
        _: metrics::SharedString,
    ) {
    }

    fn describe_gauge(
        &self,
        _: metrics::KeyName,
        _: Option<metrics::Unit>,
        _: metrics::SharedString,
    ) {
    }

    fn describe_histogram(
        &self,
        _: metrics::KeyName,
        _: Option<metrics::Unit>,
        _: metrics::SharedString,
    ) {
    }

    fn register_counter(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
        if key.name() != "pg_bootstrap_auth_total" {
            return metrics::Counter::noop();
        }
        let label = |name: &str| {
            key.labels()
                .find(|l| l.key() == name)
                .map(|l| l.value().to_string())
                .unwrap_or_default()
        };
        metrics::Counter::from_arc(Arc::new(AuthCounter {
            labels: (label("mechanism"), label("outcome")),
            seen: self.seen.clone(),
        }))
    }

    fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::noop()
    }

    fn register_histogram(
        &self,
        _: &metrics::Key,
        _: &metrics::Metadata<'_>,
    ) -> metrics::Histogram {
        metrics::Histogram::noop()
    }
}

#[test]
fn test_client_side_rejections_are_counted() {
    let recorder = AuthRecorder::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let (port, _events) = spawn_server(vec![Behavior::Md5]).await;
            assert_err!(connect(&config(port, PASSWORD), &fast_policy(1)).await);

            let (port, _events) = spawn_server(vec![Behavior::Ready]).await;
            assert_err!(connect(&config_without_password(port), &fast_policy(1)).await);

            let (port, _events) = spawn_server(vec![Behavior::BadPassword]).await;
            assert_err!(connect(&config(port, PASSWORD), &fast_policy(1)).await);
        })
    });

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("md5".to_string(), "rejected".to_string()),
            ("cleartext".to_string(), "rejected".to_string()),
            ("cleartext".to_string(), "rejected".to_string()),
        ]
    );
}
