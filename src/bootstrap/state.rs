//! Bootstrap state machine

use crate::{Error, Result};

/// Where a bootstrap run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing attempted yet
    Idle,
    /// An attempt is in flight
    Attempting,
    /// A connection was established (terminal)
    Connected,
    /// The last attempt failed and may be retried
    FailedTransient,
    /// The last attempt failed and ends the run (terminal)
    FailedFatal,
    /// Every attempt failed transiently (terminal)
    Exhausted,
    /// The caller gave up between attempts (terminal)
    Cancelled,
}

impl BootstrapState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: BootstrapState) -> bool {
        use BootstrapState::*;

        matches!(
            (self, next),
            (Idle, Attempting)
                | (Attempting, Connected)
                | (Attempting, FailedTransient)
                | (Attempting, FailedFatal)
                | (FailedTransient, Attempting)
                | (FailedTransient, Exhausted)
                | (FailedTransient, Cancelled)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: BootstrapState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::FailedFatal | Self::Exhausted | Self::Cancelled
        )
    }
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Connected => "connected",
            Self::FailedTransient => "failed_transient",
            Self::FailedFatal => "failed_fatal",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        })
    }
}
