//! # Internal Metrics Module
//!
//! Metrics are recorded at their call sites through the `metrics` facade.
//! This module registers their descriptions and, when enabled, installs the
//! Prometheus recorder whose handle the HTTP server renders at `/metrics`.
//! With no recorder installed every macro call is a no-op.

use crate::config::MetricsConfig;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Registers descriptions for every metric the relay records.
pub fn describe_metrics() {
    metrics::describe_counter!("events_received_total", Unit::Count, "Total number of events submitted by producers.");
    metrics::describe_counter!("duplicates_suppressed_total", Unit::Count, "Total number of events dropped as repeats within the cooldown window.");
    metrics::describe_gauge!("deduplication_records", Unit::Count, "The number of subjects currently tracked by the deduplicator.");
    metrics::describe_counter!("items_enqueued_total", Unit::Count, "Total number of deliveries accepted onto the queue.");
    metrics::describe_counter!("queue_full_total", Unit::Count, "Total number of deliveries rejected because the queue was full.");
    metrics::describe_gauge!("queue_length", Unit::Count, "The current number of pending deliveries.");
    metrics::describe_counter!("delivery_attempts_total", Unit::Count, "Total number of sink attempts, labeled by outcome.");
    metrics::describe_counter!("retries_scheduled_total", Unit::Count, "Total number of failed attempts re-queued for retry.");
    metrics::describe_counter!("retries_exhausted_total", Unit::Count, "Total number of deliveries dropped after exhausting retries.");
    metrics::describe_counter!("admin_notifications_total", Unit::Count, "Total number of admin notifications, labeled by status.");
    metrics::describe_histogram!("sink_request_duration_seconds", Unit::Seconds, "The latency of individual sink requests.");
    metrics::describe_histogram!("delivery_latency_seconds", Unit::Seconds, "Time from enqueue to successful delivery.");
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and returns its render handle.
    ///
    /// Returns `None` when metrics are disabled or the recorder cannot be
    /// installed (for instance because another one already is); the relay
    /// keeps running without metrics in that case.
    pub fn build(self) -> Option<PrometheusHandle> {
        if !self.config.enabled {
            return None;
        }

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
            .and_then(|b| {
                b.set_buckets_for_metric(
                    Matcher::Full("delivery_latency_seconds".to_string()),
                    LATENCY_BUCKETS,
                )
            });

        let handle = match builder.and_then(|b| b.install_recorder()) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to install Prometheus recorder: {}", e);
                return None;
            }
        };

        describe_metrics();
        info!("Prometheus metrics enabled at /metrics");
        Some(handle)
    }
}
