//! Queue consumer and export worker for the claimflow pipeline.
//!
//! A pool of long-running consumers pulls entries off the durable queue.
//! Each entry names a parent export job and a slice of beneficiaries; the
//! worker validates the parent, streams the beneficiaries' resources from
//! the upstream service into staged NDJSON artifacts, records a completion
//! key, and drives the parent job to its terminal status once every entry
//! has reported in. A per-entry monitor watches for external cancellation
//! and cuts the streaming loop short when it fires.

pub mod artifact;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{Disposition, WorkerError};
pub use monitor::{CancelToken, CancellationMonitor};
pub use pool::{QueueConsumer, WorkerPool};
pub use self::metrics::{DynMetricsSink, GaugeMetricsSink, MetricsSink, NoopMetricsSink};
pub use worker::JobWorker;

/// Basic tracing initialization for the worker binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
