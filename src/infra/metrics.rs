//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting swaps the per-interval
//! counters back to zero.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Reason a message never reached a tracker worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Shared inbound channel was full
    InboundFull,
    /// Topic did not match the positional layout
    MalformedTopic,
    /// Tracker id not configured
    UnknownTracker,
    /// Coordinate payload was not a finite number
    MalformedPayload,
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Messages received from the broker (monotonic)
    messages_total: AtomicU64,
    /// Messages received since last report
    messages_since_report: AtomicU64,
    dropped_inbound_full: AtomicU64,
    dropped_malformed_topic: AtomicU64,
    dropped_unknown_tracker: AtomicU64,
    dropped_malformed_payload: AtomicU64,
    /// Updates handed to tracker workers (monotonic)
    updates_forwarded: AtomicU64,
    /// Evaluations run (monotonic)
    evaluations_total: AtomicU64,
    /// Sum of evaluation latencies since last report
    evaluation_latency_sum_us: AtomicU64,
    /// Evaluations since last report
    evaluations_since_report: AtomicU64,
    /// Max evaluation latency since last report
    evaluation_latency_max_us: AtomicU64,
    /// Failed subscribe attempts (monotonic)
    subscribe_failures: AtomicU64,
    /// CONNACKs received (monotonic, first connection included)
    connections: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_total: AtomicU64::new(0),
            messages_since_report: AtomicU64::new(0),
            dropped_inbound_full: AtomicU64::new(0),
            dropped_malformed_topic: AtomicU64::new(0),
            dropped_unknown_tracker: AtomicU64::new(0),
            dropped_malformed_payload: AtomicU64::new(0),
            updates_forwarded: AtomicU64::new(0),
            evaluations_total: AtomicU64::new(0),
            evaluation_latency_sum_us: AtomicU64::new(0),
            evaluations_since_report: AtomicU64::new(0),
            evaluation_latency_max_us: AtomicU64::new(0),
            subscribe_failures: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
        self.messages_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::InboundFull => &self.dropped_inbound_full,
            DropReason::MalformedTopic => &self.dropped_malformed_topic,
            DropReason::UnknownTracker => &self.dropped_unknown_tracker,
            DropReason::MalformedPayload => &self.dropped_malformed_payload,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_update_forwarded(&self) {
        self.updates_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evaluation(&self, latency_us: u64) {
        self.evaluations_total.fetch_add(1, Ordering::Relaxed);
        self.evaluations_since_report.fetch_add(1, Ordering::Relaxed);
        self.evaluation_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.evaluation_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_subscribe_failure(&self) {
        self.subscribe_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::InboundFull => self.dropped_inbound_full.load(Ordering::Relaxed),
            DropReason::MalformedTopic => self.dropped_malformed_topic.load(Ordering::Relaxed),
            DropReason::UnknownTracker => self.dropped_unknown_tracker.load(Ordering::Relaxed),
            DropReason::MalformedPayload => self.dropped_malformed_payload.load(Ordering::Relaxed),
        }
    }

    pub fn messages_total(&self) -> u64 {
        self.messages_total.load(Ordering::Relaxed)
    }

    pub fn updates_forwarded(&self) -> u64 {
        self.updates_forwarded.load(Ordering::Relaxed)
    }

    pub fn evaluations_total(&self) -> u64 {
        self.evaluations_total.load(Ordering::Relaxed)
    }

    pub fn subscribe_failures(&self) -> u64 {
        self.subscribe_failures.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the per-interval ones
    pub fn report(&self) -> MetricsSummary {
        let elapsed = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let messages = self.messages_since_report.swap(0, Ordering::Relaxed);
        let evaluations = self.evaluations_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.evaluation_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.evaluation_latency_max_us.swap(0, Ordering::Relaxed);

        let secs = elapsed.as_secs_f64();
        let messages_per_sec = if secs > 0.0 { messages as f64 / secs } else { 0.0 };
        let avg_evaluation_us = if evaluations > 0 { latency_sum / evaluations } else { 0 };

        MetricsSummary {
            messages_total: self.messages_total(),
            messages_per_sec,
            updates_forwarded: self.updates_forwarded(),
            evaluations_total: self.evaluations_total(),
            avg_evaluation_us,
            max_evaluation_us: latency_max,
            dropped_inbound_full: self.dropped(DropReason::InboundFull),
            dropped_malformed_topic: self.dropped(DropReason::MalformedTopic),
            dropped_unknown_tracker: self.dropped(DropReason::UnknownTracker),
            dropped_malformed_payload: self.dropped(DropReason::MalformedPayload),
            subscribe_failures: self.subscribe_failures(),
            connections: self.connections(),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub messages_total: u64,
    pub messages_per_sec: f64,
    pub updates_forwarded: u64,
    pub evaluations_total: u64,
    pub avg_evaluation_us: u64,
    pub max_evaluation_us: u64,
    pub dropped_inbound_full: u64,
    pub dropped_malformed_topic: u64,
    pub dropped_unknown_tracker: u64,
    pub dropped_malformed_payload: u64,
    pub subscribe_failures: u64,
    pub connections: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            messages_total = %self.messages_total,
            messages_per_sec = %format!("{:.1}", self.messages_per_sec),
            updates_forwarded = %self.updates_forwarded,
            evaluations = %self.evaluations_total,
            avg_evaluation_us = %self.avg_evaluation_us,
            max_evaluation_us = %self.max_evaluation_us,
            dropped_inbound_full = %self.dropped_inbound_full,
            dropped_malformed_topic = %self.dropped_malformed_topic,
            dropped_unknown_tracker = %self.dropped_unknown_tracker,
            dropped_malformed_payload = %self.dropped_malformed_payload,
            subscribe_failures = %self.subscribe_failures,
            connections = %self.connections,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_counters_are_separate() {
        let metrics = Metrics::new();
        metrics.record_dropped(DropReason::UnknownTracker);
        metrics.record_dropped(DropReason::UnknownTracker);
        metrics.record_dropped(DropReason::MalformedPayload);

        assert_eq!(metrics.dropped(DropReason::UnknownTracker), 2);
        assert_eq!(metrics.dropped(DropReason::MalformedPayload), 1);
        assert_eq!(metrics.dropped(DropReason::InboundFull), 0);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();
        metrics.record_message_received();
        metrics.record_evaluation(100);
        metrics.record_evaluation(300);

        let summary = metrics.report();
        assert_eq!(summary.messages_total, 1);
        assert_eq!(summary.evaluations_total, 2);
        assert_eq!(summary.avg_evaluation_us, 200);
        assert_eq!(summary.max_evaluation_us, 300);

        // Monotonic totals survive, interval stats reset
        let summary = metrics.report();
        assert_eq!(summary.messages_total, 1);
        assert_eq!(summary.evaluations_total, 2);
        assert_eq!(summary.avg_evaluation_us, 0);
        assert_eq!(summary.max_evaluation_us, 0);
    }

    #[test]
    fn test_atomic_max() {
        let max = AtomicU64::new(10);
        update_atomic_max(&max, 5);
        assert_eq!(max.load(Ordering::Relaxed), 10);
        update_atomic_max(&max, 50);
        assert_eq!(max.load(Ordering::Relaxed), 50);
    }
}
