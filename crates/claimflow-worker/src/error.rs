//! Worker error taxonomy and queue entry dispositions.

use thiserror::Error;

use claimflow_storage::StorageError;

use crate::artifact::ArtifactError;

/// Errors raised while processing one queue entry.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The payload carries no upstream base path. Corrupt input; retrying
    /// never helps.
    #[error("upstream base path must be set in the job payload")]
    MissingBasePath,

    /// The parent job does not exist (yet). Retried within a budget to
    /// cover admission racing the enqueue.
    #[error("parent job {0} not found")]
    ParentJobNotFound(i64),

    /// The parent job was cancelled, before or during processing.
    #[error("parent job {0} was cancelled")]
    ParentJobCancelled(i64),

    /// Too large a share of this entry's beneficiaries failed.
    #[error("failed beneficiaries for job {job_id} exceeded threshold: {failed} of {total}")]
    FailureThresholdExceeded {
        job_id: i64,
        failed: usize,
        total: usize,
    },

    /// The upstream client for this entry's base path could not be built.
    #[error("upstream client error: {0}")]
    Upstream(#[from] claimflow_upstream::UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// What the consumer should do with the entry after processing.
#[derive(Debug)]
pub enum Disposition {
    /// The entry is durably done or unrecoverably bad; remove it.
    Ack,
    /// The store must reschedule the entry with backoff.
    Retry(WorkerError),
}
