//! Domain model for the claimflow bulk-export pipeline.
//!
//! This crate holds the types shared by every other claimflow crate: the
//! parent export job and its status state machine, the per-file completion
//! keys, the queue payload (`JobArgs`), and the beneficiary lookup record.
//! It carries no I/O; storage and transport live in the sibling crates.

pub mod args;
pub mod beneficiary;
pub mod error;
pub mod job;

pub use args::{ClaimsWindow, JobArgs, ResourceKind};
pub use beneficiary::Beneficiary;
pub use error::{CoreError, Result};
pub use job::{Aco, ExportJob, JobKey, JobStatus, BLANK_FILE_NAME};
