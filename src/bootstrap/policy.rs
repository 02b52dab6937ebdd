//! Retry policy

use crate::{Error, Result};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// How hard to try before declaring the dependency unavailable.
///
/// Immutable once built. With the default multiplier of `1.0` every wait is
/// exactly `backoff_interval`.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `backoff_interval`: 1 second
/// - `attempt_timeout`: 5 seconds
/// - `backoff_multiplier`: 1.0
/// - `max_backoff`: none
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_interval: Duration,
    attempt_timeout: Duration,
    backoff_multiplier: f64,
    max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_interval: DEFAULT_BACKOFF,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff_multiplier: 1.0,
            max_backoff: None,
        }
    }
}

impl RetryPolicy {
    /// Start from the defaults
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Total number of attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base wait between attempts
    pub fn backoff_interval(&self) -> Duration {
        self.backoff_interval
    }

    /// Time budget for a single attempt
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Growth factor applied to the wait after each failure
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Upper bound on a single wait
    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff
    }

    /// Reject policies that cannot be executed
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Error::Config(format!(
                "max_attempts must be at least 1, got {}",
                self.max_attempts
            )));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::Config("attempt_timeout must be greater than 0".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Wait before retry `n`, where `n` is the number of failures so far.
    ///
    /// `backoff_interval * multiplier^(n-1)`, capped at `max_backoff`.
    pub fn delay_for_retry(&self, n: u32) -> Duration {
        let delay = if n <= 1 || self.backoff_multiplier == 1.0 {
            self.backoff_interval
        } else {
            let exponent = i32::try_from(n - 1).unwrap_or(i32::MAX);
            let secs = self.backoff_interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        };

        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Total number of attempts (at least 1)
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Base wait between attempts
    pub fn backoff_interval(mut self, interval: Duration) -> Self {
        self.policy.backoff_interval = interval;
        self
    }

    /// Time budget for a single attempt
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.policy.attempt_timeout = timeout;
        self
    }

    /// Growth factor for the wait (1.0 keeps it fixed)
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    /// Cap on a single wait
    pub fn max_backoff(mut self, cap: Duration) -> Self {
        self.policy.max_backoff = Some(cap);
        self
    }

    /// Build the policy. Validation happens when the policy is used.
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}
