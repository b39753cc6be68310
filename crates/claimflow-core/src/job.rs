//! Parent export jobs, their status state machine, and per-file completion keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::args::ResourceKind;

/// File name recorded for a queue entry that completed successfully but
/// produced no output. Downstream bookkeeping counts the entry either way.
pub const BLANK_FILE_NAME: &str = "blank.ndjson";

/// Status of a parent export job.
///
/// Transitions form a DAG: `Pending -> InProgress -> {Completed, Failed}`,
/// with `Cancelled` reachable from `Pending` or `InProgress` only.
/// Terminal statuses are final and must never be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Cancelled,
    Failed,
    Completed,
}

impl JobStatus {
    /// Whether this status is terminal. A terminal job never changes again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Completed)
    }

    /// Whether the transition `self -> next` is allowed by the status DAG.
    /// This is the single gate behind every conditional status update the
    /// stores perform.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::InProgress | Self::Cancelled),
            Self::InProgress => {
                matches!(next, Self::Completed | Self::Failed | Self::Cancelled)
            }
            Self::Cancelled | Self::Failed | Self::Completed => false,
        }
    }

    /// Parse a status from its database representation.
    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A parent export job.
///
/// Created by the admission surface in `Pending` with a fixed `job_count`
/// (the number of queue entries the job was split into). Workers drive the
/// status forward; the authoritative completion signal is the count of
/// [`JobKey`]s, never `completed_job_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: i64,
    /// Owning tenant (ACO) identifier.
    pub aco_id: Uuid,
    pub status: JobStatus,
    /// Total queue entries this job was split into. Set at admission, immutable.
    pub job_count: i64,
    /// Advisory counter only. May lag or over-count; never used for completion.
    pub completed_job_count: i64,
    pub transaction_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent record that one artifact file was produced for a parent job.
///
/// One key is created per successfully processed queue entry. Keys are never
/// mutated and are removed only when the parent job is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobKey {
    pub job_id: i64,
    pub file_name: String,
    pub resource_type: ResourceKind,
}

impl JobKey {
    pub fn new(job_id: i64, file_name: impl Into<String>, resource_type: ResourceKind) -> Self {
        Self {
            job_id,
            file_name: file_name.into(),
            resource_type,
        }
    }

    /// Key for an entry that completed with zero bytes of output.
    pub fn blank(job_id: i64, resource_type: ResourceKind) -> Self {
        Self::new(job_id, BLANK_FILE_NAME, resource_type)
    }
}

/// Owning tenant of a parent export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aco {
    pub id: Uuid,
    /// Identifier threaded through every upstream call for this tenant.
    pub cms_id: String,
    pub name: String,
}
