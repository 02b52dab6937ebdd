//! Counter helpers

use super::labels;

/// Record the outcome of one connection attempt
pub fn attempt(outcome: &'static str) {
    metrics::counter!(labels::ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record why an attempt failed
pub fn failure(category: &'static str) {
    metrics::counter!(labels::FAILURES_TOTAL, "category" => category).increment(1);
}

/// Record the final result of a bootstrap
pub fn result(result: &'static str) {
    metrics::counter!(labels::RESULTS_TOTAL, "result" => result).increment(1);
}

/// Record an authentication exchange
pub fn auth(mechanism: &'static str, outcome: &'static str) {
    metrics::counter!(
        labels::AUTH_TOTAL,
        "mechanism" => mechanism,
        "outcome" => outcome
    )
    .increment(1);
}
