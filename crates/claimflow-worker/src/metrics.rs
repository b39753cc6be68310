//! Queue depth metric publishing.
//!
//! The pool reports outstanding queue depth after every entry it finishes,
//! but only when a deployment target is configured; local runs stay silent.

use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOB_QUEUE_COUNT: &str = "job_queue_count";
}

/// Sink for the gauges the pool publishes.
pub trait MetricsSink: Send + Sync {
    /// Records the current queue depth for the given environment tag.
    fn put_queue_depth(&self, depth: f64, environment: &str);
}

/// Type alias for a shareable MetricsSink instance.
pub type DynMetricsSink = std::sync::Arc<dyn MetricsSink>;

/// Sink backed by the `metrics` crate recorder.
#[derive(Debug, Default)]
pub struct GaugeMetricsSink;

impl MetricsSink for GaugeMetricsSink {
    fn put_queue_depth(&self, depth: f64, environment: &str) {
        gauge!(names::JOB_QUEUE_COUNT, "environment" => environment.to_string()).set(depth);
    }
}

/// Sink that drops everything. Used in tests.
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn put_queue_depth(&self, _depth: f64, _environment: &str) {}
}

/// Installs the Prometheus recorder behind the `metrics` macros.
///
/// Returns `false` when a recorder was already installed.
pub fn init_metrics() -> bool {
    match PrometheusBuilder::new().install_recorder() {
        Ok(_handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}
