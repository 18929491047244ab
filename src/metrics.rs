//! Prometheus-style metrics for order flow and feed health.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Orders posted counter metric name.
pub const METRIC_ORDERS_POSTED: &str = "orders_posted_total";
/// Order post failures counter metric name.
pub const METRIC_ORDERS_POST_FAILED: &str = "orders_post_failed_total";
/// Orders cancelled counter metric name.
pub const METRIC_ORDERS_CANCELLED: &str = "orders_cancelled_total";
/// Fills observed counter metric name.
pub const METRIC_FILLS_OBSERVED: &str = "fills_observed_total";
/// Feed events counter metric name.
pub const METRIC_FEED_EVENTS: &str = "feed_events_total";
/// Malformed deltas dropped counter metric name.
pub const METRIC_FEED_DELTAS_DROPPED: &str = "feed_deltas_dropped_total";
/// Feed reconnects counter metric name.
pub const METRIC_FEED_RECONNECTS: &str = "feed_reconnects_total";
/// Poll cycles counter metric name.
pub const METRIC_FEED_POLL_CYCLES: &str = "feed_poll_cycles_total";
/// Snapshot fetch latency metric name.
pub const METRIC_SNAPSHOT_FETCH_LATENCY: &str = "snapshot_fetch_latency_ms";
/// Order post latency metric name.
pub const METRIC_ORDER_POST_LATENCY: &str = "order_post_latency_ms";
/// Order cancel latency metric name.
pub const METRIC_ORDER_CANCEL_LATENCY: &str = "order_cancel_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_SNAPSHOT_FETCH_LATENCY,
        "Order snapshot fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDER_POST_LATENCY,
        "Maker order post latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDER_CANCEL_LATENCY,
        "Order cancel latency in milliseconds"
    );

    describe_counter!(METRIC_ORDERS_POSTED, "Total maker orders posted");
    describe_counter!(
        METRIC_ORDERS_POST_FAILED,
        "Total order posts that failed after retries"
    );
    describe_counter!(METRIC_ORDERS_CANCELLED, "Total orders cancelled at the venue");
    describe_counter!(METRIC_FILLS_OBSERVED, "Total fill reports credited");
    describe_counter!(METRIC_FEED_EVENTS, "Total feed events received");
    describe_counter!(
        METRIC_FEED_DELTAS_DROPPED,
        "Total malformed order deltas dropped"
    );
    describe_counter!(METRIC_FEED_RECONNECTS, "Total push channel reconnections");
    describe_counter!(METRIC_FEED_POLL_CYCLES, "Total polling fallback cycles");

    debug!("Metrics initialized");
}

/// Increment orders posted counter.
pub fn inc_orders_posted() {
    counter!(METRIC_ORDERS_POSTED).increment(1);
}

/// Increment order post failures counter.
pub fn inc_orders_post_failed() {
    counter!(METRIC_ORDERS_POST_FAILED).increment(1);
}

/// Add to the orders cancelled counter.
pub fn inc_orders_cancelled(count: u64) {
    counter!(METRIC_ORDERS_CANCELLED).increment(count);
}

/// Increment fills observed counter.
pub fn inc_fills_observed() {
    counter!(METRIC_FILLS_OBSERVED).increment(1);
}

/// Increment feed events counter.
pub fn inc_feed_events() {
    counter!(METRIC_FEED_EVENTS).increment(1);
}

/// Increment malformed deltas dropped counter.
pub fn inc_feed_deltas_dropped() {
    counter!(METRIC_FEED_DELTAS_DROPPED).increment(1);
}

/// Increment feed reconnects counter.
pub fn inc_feed_reconnects() {
    counter!(METRIC_FEED_RECONNECTS).increment(1);
}

/// Increment poll cycles counter.
pub fn inc_feed_poll_cycles() {
    counter!(METRIC_FEED_POLL_CYCLES).increment(1);
}

/// Timer guard that records one histogram sample when it goes out of
/// scope, covering the whole gateway or feed call it wraps.
pub struct LatencyTimer {
    metric: &'static str,
    started: Instant,
}

impl LatencyTimer {
    /// Start timing against the given histogram.
    pub fn new(metric: &'static str) -> Self {
        Self {
            metric,
            started: Instant::now(),
        }
    }

    /// Milliseconds elapsed so far; no sample is recorded.
    pub fn elapsed_ms(&self) -> f64 {
        1_000.0 * self.started.elapsed().as_secs_f64()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric).record(self.elapsed_ms());
    }
}

/// Create a latency timer for snapshot fetches.
pub fn timer_snapshot_fetch() -> LatencyTimer {
    LatencyTimer::new(METRIC_SNAPSHOT_FETCH_LATENCY)
}

/// Create a latency timer for order posts.
pub fn timer_order_post() -> LatencyTimer {
    LatencyTimer::new(METRIC_ORDER_POST_LATENCY)
}

/// Create a latency timer for order cancels.
pub fn timer_order_cancel() -> LatencyTimer {
    LatencyTimer::new(METRIC_ORDER_CANCEL_LATENCY)
}
