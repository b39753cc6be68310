//! Store traits the worker subsystem is written against.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use claimflow_core::{Aco, Beneficiary, ExportJob, JobKey, JobStatus};

use crate::error::StorageError;
use crate::types::QueueEntry;

/// Durable record of parent jobs, completion keys, and the beneficiary
/// lookup table.
///
/// Implementations must be thread-safe (`Send + Sync`). Any operation may
/// fail transiently; such failures surface as retryable [`StorageError`]s.
///
/// # Example
///
/// ```ignore
/// use claimflow_storage::{JobStore, StorageError};
///
/// async fn is_cancelled(store: &dyn JobStore, id: i64) -> Result<bool, StorageError> {
///     Ok(store.get_job_by_id(id).await?.status == JobStatus::Cancelled)
/// }
/// ```
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetches a parent job.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::JobNotFound` if no job with this id exists.
    async fn get_job_by_id(&self, id: i64) -> Result<ExportJob, StorageError>;

    /// Fetches a tenant by UUID.
    async fn get_aco_by_uuid(&self, id: Uuid) -> Result<Aco, StorageError>;

    /// Unconditionally sets a parent job's status.
    async fn update_job_status(
        &self,
        id: i64,
        new_status: JobStatus,
    ) -> Result<(), StorageError>;

    /// Compare-and-set status update: succeeds only when the job currently
    /// holds `expected` and the status DAG allows `expected -> new_status`
    /// (see `JobStatus::can_transition_to`). This is a single round trip at
    /// the store, never a read-then-write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::JobNotUpdated` when no row matched or the DAG
    /// forbids the transition; callers use it to detect that another worker
    /// (or a cancellation) got there first.
    async fn update_job_status_check_status(
        &self,
        id: i64,
        expected: JobStatus,
        new_status: JobStatus,
    ) -> Result<(), StorageError>;

    /// Records that an artifact file was produced for a parent job.
    ///
    /// Idempotent on `(job_id, file_name)`: re-inserting the same key (for
    /// example after a crash between insert and ack) must not create a
    /// duplicate row.
    async fn create_job_key(&self, key: JobKey) -> Result<(), StorageError>;

    /// Counts the completion keys recorded for a parent job. This count is
    /// the authoritative completion signal.
    async fn get_job_key_count(&self, id: i64) -> Result<i64, StorageError>;

    /// Bumps the advisory completed-entry counter, saturating at
    /// `job_count`. The counter is informational only and is never read to
    /// decide completion.
    async fn increment_completed_job_count(&self, id: i64) -> Result<(), StorageError>;

    /// Fetches a beneficiary from the lookup table.
    async fn get_beneficiary_by_id(&self, id: i64) -> Result<Beneficiary, StorageError>;
}

/// Durable FIFO-ish queue with retry bookkeeping.
///
/// The store owns the retry schedule: `retry` pushes visibility out by a
/// superlinear backoff (`error_count^4 + 3s`) so that a generous not-found
/// retry budget comfortably outlasts any legitimate admission latency.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Adds a work item. Higher priority dequeues first.
    async fn enqueue(&self, payload: &[u8], priority: i16) -> Result<i64, StorageError>;

    /// Claims the next due entry, or returns `None` when nothing is due.
    ///
    /// A claimed entry stays invisible to other consumers until it is acked
    /// or retried.
    async fn dequeue(&self) -> Result<Option<QueueEntry>, StorageError>;

    /// Durably removes a finished (or unrecoverably bad) entry.
    async fn ack(&self, entry: &QueueEntry) -> Result<(), StorageError>;

    /// Reschedules a failed entry: increments its error count and pushes
    /// its visibility out by the store's backoff.
    async fn retry(&self, entry: &QueueEntry, error: &str) -> Result<(), StorageError>;

    /// Number of entries currently in the queue (visible or not).
    async fn depth(&self) -> Result<i64, StorageError>;

    /// Waits until the store signals that an entry may be available, or
    /// until `fallback` elapses. The default implementation only sleeps;
    /// in-process backends override this to wake consumers immediately on
    /// enqueue.
    async fn wait_available(&self, fallback: Duration) {
        tokio::time::sleep(fallback).await;
    }
}
