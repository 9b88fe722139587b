//! Prometheus metrics for the detection and execution pipeline.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Mirror apply latency metric name.
pub const METRIC_MIRROR_APPLY_LATENCY: &str = "mirror_apply_latency_ms";
/// Detector run latency metric name.
pub const METRIC_DETECTOR_RUN_LATENCY: &str = "detector_run_latency_ms";
/// Submission latency metric name.
pub const METRIC_SUBMIT_LATENCY: &str = "submit_latency_ms";
/// Pool events received counter metric name.
pub const METRIC_EVENTS_RECEIVED: &str = "pool_events_received_total";
/// Stale events dropped counter metric name.
pub const METRIC_EVENTS_STALE_DROPPED: &str = "pool_events_stale_dropped_total";
/// Undecodable events counter metric name.
pub const METRIC_EVENTS_DECODE_FAILED: &str = "pool_events_decode_failed_total";
/// Detector runs counter metric name.
pub const METRIC_DETECTOR_RUNS: &str = "detector_runs_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Opportunities enqueued counter metric name.
pub const METRIC_OPPORTUNITIES_ENQUEUED: &str = "opportunities_enqueued_total";
/// Opportunities expired counter metric name.
pub const METRIC_OPPORTUNITIES_EXPIRED: &str = "opportunities_expired_total";
/// Simulation reverts counter metric name.
pub const METRIC_SIMULATIONS_REVERTED: &str = "simulations_reverted_total";
/// Gas-based skips counter metric name.
pub const METRIC_GAS_SKIPS: &str = "gas_skips_total";
/// Successful trades counter metric name.
pub const METRIC_TRADES_SUCCEEDED: &str = "trades_succeeded_total";
/// Failed trades counter metric name.
pub const METRIC_TRADES_FAILED: &str = "trades_failed_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_MIRROR_APPLY_LATENCY,
        "Pool event application latency in milliseconds"
    );
    describe_histogram!(
        METRIC_DETECTOR_RUN_LATENCY,
        "Detector run latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SUBMIT_LATENCY,
        "Transaction submission latency in milliseconds"
    );

    describe_counter!(METRIC_EVENTS_RECEIVED, "Pool events received");
    describe_counter!(
        METRIC_EVENTS_STALE_DROPPED,
        "Out-of-order pool events discarded"
    );
    describe_counter!(
        METRIC_EVENTS_DECODE_FAILED,
        "Pool events dropped due to decode failure"
    );
    describe_counter!(METRIC_DETECTOR_RUNS, "Detector runs");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Arbitrage opportunities detected"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_ENQUEUED,
        "Arbitrage opportunities enqueued"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_EXPIRED,
        "Arbitrage opportunities expired before execution"
    );
    describe_counter!(METRIC_SIMULATIONS_REVERTED, "Simulation reverts");
    describe_counter!(METRIC_GAS_SKIPS, "Opportunities skipped on gas grounds");
    describe_counter!(METRIC_TRADES_SUCCEEDED, "Trades mined successfully");
    describe_counter!(METRIC_TRADES_FAILED, "Trades failed");
    describe_counter!(METRIC_WS_RECONNECTS, "WebSocket reconnections");

    debug!("Metrics initialized");
}

/// Record mirror apply latency.
pub fn record_mirror_apply_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_MIRROR_APPLY_LATENCY).record(latency_ms);
}

/// Record detector run latency.
pub fn record_detector_run_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_DETECTOR_RUN_LATENCY).record(latency_ms);
}

/// Record submission latency.
pub fn record_submit_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SUBMIT_LATENCY).record(latency_ms);
}

/// Increment pool events received.
pub fn inc_events_received() {
    counter!(METRIC_EVENTS_RECEIVED).increment(1);
}

/// Increment stale events dropped.
pub fn inc_events_stale_dropped() {
    counter!(METRIC_EVENTS_STALE_DROPPED).increment(1);
}

/// Increment undecodable events dropped.
pub fn inc_events_decode_failed() {
    counter!(METRIC_EVENTS_DECODE_FAILED).increment(1);
}

/// Increment detector runs.
pub fn inc_detector_runs() {
    counter!(METRIC_DETECTOR_RUNS).increment(1);
}

/// Increment opportunities detected.
pub fn inc_opportunities_detected(count: u64) {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(count);
}

/// Increment opportunities enqueued.
pub fn inc_opportunities_enqueued() {
    counter!(METRIC_OPPORTUNITIES_ENQUEUED).increment(1);
}

/// Increment opportunities expired.
pub fn inc_opportunities_expired() {
    counter!(METRIC_OPPORTUNITIES_EXPIRED).increment(1);
}

/// Increment simulation reverts.
pub fn inc_simulations_reverted() {
    counter!(METRIC_SIMULATIONS_REVERTED).increment(1);
}

/// Increment gas-based skips.
pub fn inc_gas_skips() {
    counter!(METRIC_GAS_SKIPS).increment(1);
}

/// Increment successful trades.
pub fn inc_trades_succeeded() {
    counter!(METRIC_TRADES_SUCCEEDED).increment(1);
}

/// Increment failed trades.
pub fn inc_trades_failed() {
    counter!(METRIC_TRADES_FAILED).increment(1);
}

/// Increment WebSocket reconnects.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}
