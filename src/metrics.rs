// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the worker configuration reconciler.
//!
//! All metrics carry the namespace prefix `workerconfig_` and live in a
//! dedicated registry served by the `/metrics` endpoint.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcomes, skips, retries and apply latency
//! - **Discovery Metrics** - API server addresses found by the endpoint watcher
//! - **Leader Election Metrics** - Track leadership state changes
//!
//! # Example
//!
//! ```rust,no_run
//! use workerconfig::metrics::{gather_metrics, record_reconciliation_applied};
//!
//! record_reconciliation_applied(std::time::Duration::from_millis(250));
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("workerconfig_reconciliations_total"));
//! ```

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "workerconfig";

/// Skip reason: this replica does not hold the lease
pub const SKIP_NOT_LEADER: &str = "not_leader";

/// Skip reason: cluster config or API servers are still unknown
pub const SKIP_INCOMPLETE: &str = "incomplete";

/// Skip reason: the desired snapshot has already been applied
pub const SKIP_UNCHANGED: &str = "unchanged";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliation attempts by outcome
///
/// Labels:
/// - `outcome`: `applied`, `failed` or `skipped`
pub static RECONCILIATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation attempts by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of skipped reconciliations by reason
///
/// Labels:
/// - `reason`: `not_leader`, `incomplete` or `unchanged`
pub static RECONCILIATION_SKIPS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_skips_total"),
        "Total number of skipped reconciliations by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of apply calls in seconds, successful or not
pub static APPLY_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_apply_duration_seconds"),
        "Duration of worker configuration apply calls in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of timer-driven retries of a failed reconciliation
///
/// Labels:
/// - `outcome`: `recovered` or `failed`
pub static RETRIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_retries_total"),
        "Total number of retries of a failed reconciliation by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Number of API server addresses from the latest successful extraction
pub static API_SERVERS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_api_servers"),
        "Number of API server addresses currently discovered",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of warnings raised while extracting API server addresses
pub static ENDPOINT_EXTRACTION_WARNINGS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_endpoint_extraction_warnings_total"),
        "Total number of warnings raised while extracting API server addresses",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Total number of leader election events
///
/// Labels:
/// - `status`: Event type (`acquired`, `lost`)
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_elections_total"),
        "Total number of leader election events by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Current leader election status
///
/// Labels:
/// - `identity`: Lease holder identity of this replica
///
/// Value: 1 if leader, 0 if follower
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["identity"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a reconciliation whose resources were applied
///
/// # Arguments
/// * `duration` - Duration of the apply call
pub fn record_reconciliation_applied(duration: Duration) {
    RECONCILIATIONS_TOTAL.with_label_values(&["applied"]).inc();
    APPLY_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a reconciliation that failed to generate or apply resources
///
/// # Arguments
/// * `duration` - Duration of the apply call, if one was made
pub fn record_reconciliation_failed(duration: Option<Duration>) {
    RECONCILIATIONS_TOTAL.with_label_values(&["failed"]).inc();
    if let Some(duration) = duration {
        APPLY_DURATION_SECONDS.observe(duration.as_secs_f64());
    }
}

/// Record a skipped reconciliation
///
/// # Arguments
/// * `reason` - One of [`SKIP_NOT_LEADER`], [`SKIP_INCOMPLETE`], [`SKIP_UNCHANGED`]
pub fn record_reconciliation_skipped(reason: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&["skipped"]).inc();
    RECONCILIATION_SKIPS_TOTAL
        .with_label_values(&[reason])
        .inc();
}

/// Record the outcome of a timer-driven retry
pub fn record_retry(recovered: bool) {
    let outcome = if recovered { "recovered" } else { "failed" };
    RETRIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record the result of an API server address extraction
///
/// # Arguments
/// * `api_servers` - Number of addresses extracted, `None` if extraction failed
/// * `warnings` - Number of warnings raised
pub fn record_endpoint_extraction(api_servers: Option<usize>, warnings: usize) {
    if let Some(count) = api_servers {
        #[allow(clippy::cast_precision_loss)]
        API_SERVERS.set(count as f64);
    }
    #[allow(clippy::cast_precision_loss)]
    ENDPOINT_EXTRACTION_WARNINGS_TOTAL.inc_by(warnings as f64);
}

/// Record leader election acquired
///
/// # Arguments
/// * `identity` - Identity of the replica that acquired leadership
pub fn record_leader_elected(identity: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[identity]).set(1.0);
}

/// Record leader election lost
///
/// # Arguments
/// * `identity` - Identity of the replica that lost leadership
pub fn record_leader_lost(identity: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[identity]).set(0.0);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_applied() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["applied"]).get();
        let samples = APPLY_DURATION_SECONDS.get_sample_count();

        record_reconciliation_applied(Duration::from_millis(500));

        assert!(RECONCILIATIONS_TOTAL.with_label_values(&["applied"]).get() > before);
        assert!(APPLY_DURATION_SECONDS.get_sample_count() > samples);
    }

    #[test]
    fn test_record_reconciliation_failed_without_apply() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["failed"]).get();

        record_reconciliation_failed(None);

        assert!(RECONCILIATIONS_TOTAL.with_label_values(&["failed"]).get() > before);
    }

    #[test]
    fn test_record_reconciliation_skipped() {
        let before = RECONCILIATION_SKIPS_TOTAL
            .with_label_values(&[SKIP_UNCHANGED])
            .get();

        record_reconciliation_skipped(SKIP_UNCHANGED);

        let after = RECONCILIATION_SKIPS_TOTAL
            .with_label_values(&[SKIP_UNCHANGED])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_record_retry() {
        let before = RETRIES_TOTAL.with_label_values(&["recovered"]).get();
        record_retry(true);
        assert!(RETRIES_TOTAL.with_label_values(&["recovered"]).get() > before);
    }

    #[test]
    fn test_record_endpoint_extraction_counts_warnings() {
        let warnings = ENDPOINT_EXTRACTION_WARNINGS_TOTAL.get();
        record_endpoint_extraction(None, 2);
        assert!(ENDPOINT_EXTRACTION_WARNINGS_TOTAL.get() >= warnings + 2.0);
    }

    #[test]
    fn test_record_leader_elected_and_lost() {
        let identity = "test-replica";

        record_leader_elected(identity);
        assert!(
            (LEADER_STATUS.with_label_values(&[identity]).get() - 1.0).abs() < f64::EPSILON
        );

        record_leader_lost(identity);
        assert!(LEADER_STATUS.with_label_values(&[identity]).get().abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_skipped(SKIP_NOT_LEADER);

        let metrics = gather_metrics().unwrap();
        assert!(metrics.contains("workerconfig_reconciliations_total"));
        assert!(metrics.contains("workerconfig_reconciliation_skips_total"));
    }
}
