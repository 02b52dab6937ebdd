//! Histogram helpers

use super::labels;
use std::time::Duration;

/// Record how long one attempt took
pub fn attempt_duration(elapsed: Duration) {
    metrics::histogram!(labels::ATTEMPT_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
}

/// Record how long a whole bootstrap took
pub fn total_duration(result: &'static str, elapsed: Duration) {
    metrics::histogram!(labels::TOTAL_DURATION_MS, "result" => result)
        .record(elapsed.as_secs_f64() * 1000.0);
}
