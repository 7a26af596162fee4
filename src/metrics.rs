// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Milliseconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[allow(unused_imports)]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

use std::time::Duration;

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "rpc_calls_total",
        Unit::Count,
        "Total JSON-RPC calls, labeled by component, method and outcome."
    );
    describe_histogram!(
        "rpc_call_latency_ms",
        Unit::Milliseconds,
        "JSON-RPC call latency in milliseconds, labeled by component and method."
    );
    describe_counter!(
        "log_scan_windows_total",
        Unit::Count,
        "Total block windows queried by the backward log scanner."
    );
    describe_counter!(
        "log_scan_window_shrinks_total",
        Unit::Count,
        "Total window shrinks, labeled by cause (range, transient)."
    );
    describe_counter!(
        "log_scan_outcomes_total",
        Unit::Count,
        "Finished scans, labeled by outcome (found, not_found, incomplete, failed)."
    );
    describe_gauge!(
        "aggregator_registered_operators",
        "Registered operators in the last aggregation."
    );
    describe_gauge!(
        "aggregator_nonregistered_operators",
        "Nonregistered operators in the last aggregation."
    );
    describe_gauge!(
        "aggregator_skipped_operators",
        "Operators skipped after a failed registry read in the last aggregation."
    );
}

pub fn record_rpc_call(component: &str, method: &str, duration: Duration, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    increment_counter!(
        "rpc_calls_total",
        "component" => component.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    );
    histogram!(
        "rpc_call_latency_ms",
        duration.as_secs_f64() * 1000.0,
        "component" => component.to_string(),
        "method" => method.to_string()
    );
}

pub fn increment_scan_window() {
    increment_counter!("log_scan_windows_total");
}

pub fn increment_window_shrink(cause: &'static str) {
    increment_counter!("log_scan_window_shrinks_total", "cause" => cause);
}

pub fn increment_scan_outcome(outcome: &'static str) {
    increment_counter!("log_scan_outcomes_total", "outcome" => outcome);
}

pub fn set_aggregation_partition(registered: usize, nonregistered: usize, skipped: usize) {
    gauge!("aggregator_registered_operators", registered as f64);
    gauge!("aggregator_nonregistered_operators", nonregistered as f64);
    gauge!("aggregator_skipped_operators", skipped as f64);
}
