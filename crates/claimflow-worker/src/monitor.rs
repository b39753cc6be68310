//! Per-entry cancellation monitoring.
//!
//! While an entry is being processed, a background task re-reads the parent
//! job on a fixed cadence. If it observes `Cancelled`, it fires the entry's
//! cancellation signal; the streaming loop checks the signal between
//! beneficiaries and stops. Poll errors never cancel by themselves; they
//! are logged and the next tick tries again.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use claimflow_core::JobStatus;
use claimflow_storage::DynJobStore;

/// Cancellation signal handed to the streaming loop.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Whether the parent job has been observed cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that never fires, for callers outside a monitored entry.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

/// Background poller bound to one in-flight queue entry.
pub struct CancellationMonitor {
    cancel_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CancellationMonitor {
    /// Starts polling the parent job's status every `poll_interval`.
    pub fn spawn(job_store: DynJobStore, job_id: i64, poll_interval: Duration) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            // The first tick completes immediately; consume it so the first
            // status read happens one full interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match job_store.get_job_by_id(job_id).await {
                            Ok(job) if job.status == JobStatus::Cancelled => {
                                info!(job_id, "Parent job cancelled; signalling in-flight entry");
                                let _ = cancel_tx.send(true);
                                return;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(job_id, error = %e, "Could not determine parent job status");
                            }
                        }
                    }
                    _ = stop_rx.changed() => return,
                }
            }
        });

        Self {
            cancel_rx,
            stop_tx,
            task,
        }
    }

    /// Signal checked by the entry's streaming loop.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.cancel_rx.clone(),
        }
    }

    /// Stops the poller once the entry's processing has completed.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
