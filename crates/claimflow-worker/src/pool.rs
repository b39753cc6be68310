//! Long-running queue consumers and pool lifecycle.
//!
//! `WorkerPool::start` launches N consumers sharing one queue store. Each
//! consumer claims an entry, runs it synchronously on its own task (the
//! pool's parallelism equals N), maps the outcome onto an ack or a retry,
//! and publishes the queue depth gauge. `stop` flips a shutdown flag that
//! prevents new claims, lets in-flight entries run to completion, and joins
//! every consumer; entries never dispatched stay visible in the store for
//! the next process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use claimflow_core::JobArgs;
use claimflow_storage::{DynJobStore, DynQueueStore, QueueEntry};
use claimflow_upstream::UpstreamClientFactory;

use crate::config::WorkerConfig;
use crate::error::{Disposition, WorkerError};
use crate::metrics::DynMetricsSink;
use crate::monitor::CancellationMonitor;
use crate::worker::JobWorker;

/// How long an idle consumer waits for the store's availability signal
/// before polling again.
const DEQUEUE_FALLBACK: Duration = Duration::from_secs(5);

/// Pause after a failed dequeue before hitting the store again.
const ERROR_RECOVERY_SLEEP: Duration = Duration::from_secs(1);

/// One consumer's shared context; cloned into every pool task.
#[derive(Clone)]
pub struct QueueConsumer {
    job_store: DynJobStore,
    queue: DynQueueStore,
    worker: JobWorker,
    metrics: DynMetricsSink,
    config: Arc<WorkerConfig>,
}

/// Handle to the running consumers.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Launches `concurrency` consumers. Returns immediately; the consumers
    /// run until [`WorkerPool::stop`].
    pub fn start(consumer: QueueConsumer, concurrency: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumers = (0..concurrency)
            .map(|index| {
                let consumer = consumer.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(consumer.run(index, shutdown_rx))
            })
            .collect();

        info!(concurrency, "Worker pool started");

        Self {
            shutdown_tx,
            consumers,
        }
    }

    /// Signals every consumer to drain and waits for them to finish.
    pub async fn stop(self) {
        info!("Worker pool draining");
        let _ = self.shutdown_tx.send(true);
        for handle in self.consumers {
            let _ = handle.await;
        }
        info!("Worker pool stopped");
    }
}

impl QueueConsumer {
    pub fn new(
        job_store: DynJobStore,
        queue: DynQueueStore,
        upstream_factory: Arc<dyn UpstreamClientFactory>,
        metrics: DynMetricsSink,
        config: Arc<WorkerConfig>,
    ) -> Self {
        let worker = JobWorker::new(job_store.clone(), upstream_factory, config.clone());
        Self {
            job_store,
            queue,
            worker,
            metrics,
            config,
        }
    }

    async fn run(self, index: usize, mut shutdown_rx: watch::Receiver<bool>) {
        info!(consumer = index, "Queue consumer started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.queue.dequeue().await {
                Ok(Some(entry)) => {
                    self.process_entry(&entry).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.queue.wait_available(DEQUEUE_FALLBACK) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                Err(e) => {
                    error!(consumer = index, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = tokio::time::sleep(ERROR_RECOVERY_SLEEP) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }

        info!(consumer = index, "Queue consumer stopped");
    }

    /// Runs one entry and settles it with the queue store.
    pub async fn process_entry(&self, entry: &QueueEntry) {
        match self.handle_entry(entry).await {
            Disposition::Ack => {
                if let Err(e) = self.queue.ack(entry).await {
                    error!(entry_id = entry.id, error = %e, "Failed to ack queue entry");
                }
            }
            Disposition::Retry(err) => {
                if let Err(e) = self.queue.retry(entry, &err.to_string()).await {
                    error!(entry_id = entry.id, error = %e, "Failed to reschedule queue entry");
                }
            }
        }

        self.publish_queue_depth().await;
    }

    /// Decides an entry's disposition: decode, start the cancellation
    /// monitor, validate, process, and map errors per the retry taxonomy.
    pub async fn handle_entry(&self, entry: &QueueEntry) -> Disposition {
        let args = match JobArgs::decode(&entry.payload) {
            Ok(args) => args,
            Err(e) => {
                // Retrying never fixes a payload that does not decode.
                warn!(entry_id = entry.id, error = %e, "Failed to decode queue payload; removing entry");
                return Disposition::Ack;
            }
        };

        let monitor = CancellationMonitor::spawn(
            self.job_store.clone(),
            args.job_id,
            self.config.status_poll_interval,
        );
        let token = monitor.token();

        let result = match self.worker.validate_job(&args).await {
            Ok(job) => self.worker.process_job(&job, &args, &token).await,
            Err(err) => Err(err),
        };
        monitor.stop().await;

        match result {
            Ok(()) => Disposition::Ack,
            Err(WorkerError::ParentJobCancelled(job_id)) => {
                warn!(
                    entry_id = entry.id,
                    job_id, "Entry belongs to a cancelled parent job; removing entry"
                );
                Disposition::Ack
            }
            Err(WorkerError::MissingBasePath) => {
                warn!(
                    entry_id = entry.id,
                    job_id = args.job_id,
                    "Job payload has no upstream base path; removing entry"
                );
                Disposition::Ack
            }
            Err(WorkerError::ParentJobNotFound(job_id)) => {
                if entry.error_count >= self.config.max_job_not_found_retries {
                    error!(
                        entry_id = entry.id,
                        job_id,
                        aco_id = %args.aco_id,
                        "Parent job not found and retries exhausted; removing entry"
                    );
                    Disposition::Ack
                } else {
                    warn!(
                        entry_id = entry.id,
                        job_id,
                        aco_id = %args.aco_id,
                        "Parent job not found; will retry"
                    );
                    Disposition::Retry(WorkerError::ParentJobNotFound(job_id))
                }
            }
            Err(err @ WorkerError::FailureThresholdExceeded { .. }) => {
                error!(entry_id = entry.id, error = %err, "Entry failed permanently");
                Disposition::Ack
            }
            Err(err) => Disposition::Retry(err),
        }
    }

    /// Reports outstanding queue depth, only when an environment tag is
    /// configured.
    async fn publish_queue_depth(&self) {
        let Some(environment) = self.config.deployment_target.as_deref() else {
            return;
        };

        match self.queue.depth().await {
            Ok(depth) => self.metrics.put_queue_depth(depth as f64, environment),
            Err(e) => warn!(error = %e, "Could not read queue depth"),
        }
    }
}
