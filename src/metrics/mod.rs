//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the application installs a recorder
//! (for example a Prometheus exporter).

pub mod counters;
pub mod histograms;
pub mod labels;
