//! In-memory store backends for claimflow.
//!
//! This crate implements the `JobStore` and `QueueStore` traits from
//! `claimflow-storage` over plain in-process maps. It backs the worker's
//! scenario tests and local development runs; production deployments use
//! `claimflow-db-postgres`.
//!
//! # Example
//!
//! ```ignore
//! use claimflow_db_memory::{MemoryJobStore, MemoryQueueStore};
//!
//! let jobs = MemoryJobStore::new();
//! jobs.insert_job(seed_job(1, 4));
//! let queue = MemoryQueueStore::new();
//! queue.enqueue(&args.encode()?, 0).await?;
//! ```

mod job_store;
mod queue_store;

pub use job_store::MemoryJobStore;
pub use queue_store::{retry_backoff, MemoryQueueStore};

// Re-export the store traits for convenience
pub use claimflow_storage::{JobStore, QueueStore, StorageError};
