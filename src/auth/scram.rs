//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677) as used by Postgres 10+
//!
//! Channel binding is not offered (`n,,` GS2 header). The user name is sent
//! empty because Postgres takes it from the startup message.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const GS2_HEADER: &str = "n,,";
const NONCE_LEN: usize = 18;
/// Highest PBKDF2 iteration count accepted from a server
pub const MAX_ITERATIONS: u32 = 1_000_000;

/// SCRAM exchange failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScramError {
    /// Server message is malformed or inconsistent
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),
    /// Server reported an error (`e=` attribute)
    #[error("server rejected SCRAM exchange: {0}")]
    ServerError(String),
    /// Server signature did not verify
    #[error("server signature verification failed")]
    InvalidServerSignature,
    /// Messages were processed out of order
    #[error("SCRAM exchange out of order: {0}")]
    OutOfOrder(&'static str),
}

#[derive(Debug)]
enum Step {
    Initial,
    SentFirst,
    SentFinal { server_signature: Vec<u8> },
    Done,
}

/// Client side of one SCRAM-SHA-256 exchange
pub struct ScramSha256 {
    password: String,
    nonce: String,
    step: Step,
}

impl std::fmt::Debug for ScramSha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramSha256")
            .field("nonce", &self.nonce)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl ScramSha256 {
    /// Start an exchange with a random client nonce
    pub fn new(password: impl Into<String>) -> Self {
        let mut raw = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut raw);
        Self::with_nonce(password, BASE64.encode(raw))
    }

    fn with_nonce(password: impl Into<String>, nonce: String) -> Self {
        Self {
            password: password.into(),
            nonce,
            step: Step::Initial,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// client-first-message, sent in SASLInitialResponse
    pub fn client_first(&mut self) -> Vec<u8> {
        self.step = Step::SentFirst;
        format!("{}{}", GS2_HEADER, self.client_first_bare()).into_bytes()
    }

    /// Consume server-first-message and produce client-final-message
    pub fn handle_server_first(&mut self, data: &[u8]) -> Result<Vec<u8>, ScramError> {
        if !matches!(self.step, Step::SentFirst) {
            return Err(ScramError::OutOfOrder("server-first before client-first"));
        }
        let server_first = std::str::from_utf8(data)
            .map_err(|_| ScramError::InvalidServerMessage("server-first is not UTF-8".into()))?;
        let first = ServerFirst::parse(server_first)?;

        if !first.nonce.starts_with(&self.nonce) || first.nonce.len() == self.nonce.len() {
            return Err(ScramError::InvalidServerMessage(
                "server nonce does not extend client nonce".into(),
            ));
        }

        let salted = salted_password(self.password.as_bytes(), &first.salt, first.iterations);
        let client_key = hmac(&salted, b"Client Key");
        let stored_key = Sha256::digest(&client_key);

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), first.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            without_proof
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = hmac(&salted, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());
        self.step = Step::SentFinal { server_signature };

        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)).into_bytes())
    }

    /// Verify server-final-message
    pub fn verify_server_final(&mut self, data: &[u8]) -> Result<(), ScramError> {
        let expected = match std::mem::replace(&mut self.step, Step::Done) {
            Step::SentFinal { server_signature } => server_signature,
            _ => return Err(ScramError::OutOfOrder("server-final before client-final")),
        };
        let server_final = std::str::from_utf8(data)
            .map_err(|_| ScramError::InvalidServerMessage("server-final is not UTF-8".into()))?;

        if let Some(reason) = server_final.strip_prefix("e=") {
            return Err(ScramError::ServerError(reason.to_string()));
        }
        let verifier = server_final
            .split(',')
            .find_map(|attr| attr.strip_prefix("v="))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing verifier".into()))?;
        let received = BASE64
            .decode(verifier)
            .map_err(|_| ScramError::InvalidServerMessage("verifier is not base64".into()))?;

        if constant_time_eq(&received, &expected) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerSignature)
        }
    }
}

#[derive(Debug)]
struct ServerFirst {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl ServerFirst {
    fn parse(msg: &str) -> Result<Self, ScramError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in msg.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => nonce = Some(v),
                Some(("s", v)) => salt = Some(v),
                Some(("i", v)) => iterations = Some(v),
                Some(("e", v)) => return Err(ScramError::ServerError(v.to_string())),
                _ => {}
            }
        }

        let missing = |name: &str| ScramError::InvalidServerMessage(format!("missing {}", name));
        let nonce = nonce.filter(|n| !n.is_empty()).ok_or_else(|| missing("nonce"))?;
        let salt = BASE64
            .decode(salt.ok_or_else(|| missing("salt"))?)
            .map_err(|_| ScramError::InvalidServerMessage("salt is not base64".into()))?;
        let iterations = iterations
            .ok_or_else(|| missing("iteration count"))?
            .parse::<u32>()
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| ScramError::InvalidServerMessage("invalid iteration count".into()))?;
        if iterations > MAX_ITERATIONS {
            return Err(ScramError::InvalidServerMessage(format!(
                "iteration count {} exceeds {}",
                iterations, MAX_ITERATIONS
            )));
        }

        Ok(Self {
            nonce: nonce.to_string(),
            salt,
            iterations,
        })
    }
}

fn salted_password(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    // HMAC accepts keys of any length, so this cannot fail
    let _ = pbkdf2::pbkdf2::<HmacSha256>(password, salt, iterations, &mut out);
    out
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
