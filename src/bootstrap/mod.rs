//! Connect-with-retry
//!
//! [`Bootstrapper`] drives a [`Connector`] through a bounded retry loop:
//!
//! 1. Validate the configuration and policy (no attempt on failure)
//! 2. Attempt, bounded by `attempt_timeout`
//! 3. Success returns at once; transient failures wait and retry; anything
//!    else is returned at once
//! 4. After `max_attempts` transient failures the run ends with
//!    [`Error::RetryBudgetExhausted`], carrying the last failure
//!
//! [`connect`] and [`with_connection`] are the Postgres entry points.

mod connector;
mod policy;
mod state;

pub use connector::{Connector, PgConnector};
pub use policy::{RetryPolicy, RetryPolicyBuilder};
pub use state::BootstrapState;

use crate::connection::{Connection, ConnectionConfig, TlsConfig};
use crate::metrics::{counters, histograms, labels};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// How a failed attempt affects the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The dependency is not ready yet; retry after the backoff
    Transient,
    /// Credentials were rejected; retrying cannot help
    AuthenticationRejected,
    /// Configuration or policy is malformed
    ConfigurationInvalid,
    /// Any other non-retryable failure
    Fatal,
}

/// Successful bootstrap result
#[derive(Debug)]
pub struct Bootstrapped<H> {
    /// The established connection
    pub handle: H,
    /// Attempts performed, including the successful one
    pub attempts: u32,
    /// Time from the first attempt to success, backoff included
    pub elapsed: Duration,
}

/// Retry loop over a [`Connector`]
#[derive(Debug, Clone)]
pub struct Bootstrapper<C> {
    connector: C,
    policy: RetryPolicy,
}

impl<C: Connector> Bootstrapper<C> {
    /// Create a bootstrapper
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// The retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run until connected, a fatal failure, or the retry budget runs out
    pub async fn run(&self, config: &ConnectionConfig) -> Result<Bootstrapped<C::Handle>> {
        self.run_until(config, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but gives up with [`Error::Cancelled`] once
    /// `shutdown` resolves.
    ///
    /// `shutdown` is observed before each retry and while waiting out the
    /// backoff. An attempt already in flight is not interrupted.
    pub async fn run_until<S>(
        &self,
        config: &ConnectionConfig,
        shutdown: S,
    ) -> Result<Bootstrapped<C::Handle>>
    where
        S: Future<Output = ()>,
    {
        let span = tracing::info_span!(
            "bootstrap",
            host = %config.host(),
            port = config.port(),
            database = %config.database()
        );
        self.run_inner(config, shutdown).instrument(span).await
    }

    async fn run_inner<S>(
        &self,
        config: &ConnectionConfig,
        shutdown: S,
    ) -> Result<Bootstrapped<C::Handle>>
    where
        S: Future<Output = ()>,
    {
        if let Err(err) = self.policy.validate().and_then(|_| config.validate()) {
            tracing::error!(error = %err, "invalid bootstrap configuration");
            counters::result(labels::RESULT_CONFIG_INVALID);
            return Err(err);
        }

        tokio::pin!(shutdown);
        let max_attempts = self.policy.max_attempts();
        let started = Instant::now();
        let mut state = BootstrapState::Idle;
        let mut attempts = 0u32;

        loop {
            state.transition(BootstrapState::Attempting)?;
            attempts += 1;
            tracing::debug!(attempt = attempts, max_attempts, "connecting");

            let attempt_started = Instant::now();
            let outcome = match tokio::time::timeout(
                self.policy.attempt_timeout(),
                self.connector.connect(config),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout(self.policy.attempt_timeout())),
            };
            histograms::attempt_duration(attempt_started.elapsed());

            let err = match outcome {
                Ok(handle) => {
                    state.transition(BootstrapState::Connected)?;
                    let elapsed = started.elapsed();
                    counters::attempt(labels::OUTCOME_CONNECTED);
                    finish(labels::RESULT_CONNECTED, elapsed);
                    tracing::info!(
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "connected"
                    );
                    return Ok(Bootstrapped {
                        handle,
                        attempts,
                        elapsed,
                    });
                }
                Err(err) => err,
            };

            let class = err.classify();
            counters::failure(err.category());
            if class != FailureClass::Transient {
                state.transition(BootstrapState::FailedFatal)?;
                counters::attempt(labels::OUTCOME_FATAL);
                finish(result_label(class), started.elapsed());
                tracing::error!(
                    attempt = attempts,
                    error = %err,
                    category = err.category(),
                    ?class,
                    "giving up"
                );
                return Err(err);
            }

            state.transition(BootstrapState::FailedTransient)?;
            counters::attempt(labels::OUTCOME_TRANSIENT);

            if attempts >= max_attempts {
                state.transition(BootstrapState::Exhausted)?;
                finish(labels::RESULT_EXHAUSTED, started.elapsed());
                tracing::error!(attempts, error = %err, "dependency unavailable, gave up");
                return Err(Error::RetryBudgetExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_for_retry(attempts);
            tracing::warn!(
                attempt = attempts,
                remaining = max_attempts - attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                category = err.category(),
                "dependency unavailable, will retry"
            );

            let cancelled = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                state.transition(BootstrapState::Cancelled)?;
                finish(labels::RESULT_CANCELLED, started.elapsed());
                tracing::info!(attempts, "bootstrap cancelled");
                return Err(Error::Cancelled { attempts });
            }
        }
    }
}

fn finish(result: &'static str, elapsed: Duration) {
    counters::result(result);
    histograms::total_duration(result, elapsed);
}

fn result_label(class: FailureClass) -> &'static str {
    match class {
        FailureClass::AuthenticationRejected => labels::RESULT_AUTH_REJECTED,
        FailureClass::ConfigurationInvalid => labels::RESULT_CONFIG_INVALID,
        FailureClass::Transient | FailureClass::Fatal => labels::RESULT_FATAL,
    }
}

/// Connect to Postgres, retrying transient failures per `policy`.
///
/// The returned connection has completed its startup handshake.
pub async fn connect(config: &ConnectionConfig, policy: &RetryPolicy) -> Result<Connection> {
    Bootstrapper::new(PgConnector::new(), policy.clone())
        .run(config)
        .await
        .map(|b| b.handle)
}

/// [`connect`] with an explicit TLS configuration
pub async fn connect_with_tls(
    config: &ConnectionConfig,
    policy: &RetryPolicy,
    tls: TlsConfig,
) -> Result<Connection> {
    Bootstrapper::new(PgConnector::with_tls(tls), policy.clone())
        .run(config)
        .await
        .map(|b| b.handle)
}

/// Connect, run `f`, and close the connection whatever `f` returned.
///
/// An error from `f` takes precedence over an error while closing.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> pg_bootstrap::Result<()> {
/// use pg_bootstrap::{with_connection, ConnectionConfig, RetryPolicy};
///
/// let config = ConnectionConfig::builder("db", 5432, "userinfo").build();
/// let version = with_connection(&config, &RetryPolicy::default(), |conn| {
///     Box::pin(async move {
///         Ok(conn.server_parameter("server_version").map(str::to_owned))
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_connection<T, F>(
    config: &ConnectionConfig,
    policy: &RetryPolicy,
    f: F,
) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
{
    let mut conn = connect(config, policy).await?;
    let result = f(&mut conn).await;
    let closed = conn.close().await;

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Err(close_err)) => {
            tracing::debug!(error = %close_err, "close failed after error");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}
