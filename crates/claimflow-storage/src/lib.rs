//! Storage abstractions for the claimflow pipeline.
//!
//! Two durable stores back the worker subsystem: the [`JobStore`] holds
//! parent export jobs, their completion keys, and the beneficiary lookup
//! table; the [`QueueStore`] holds the FIFO-ish work items with retry
//! bookkeeping. Both are defined here as object-safe traits so backends
//! (Postgres in production, in-memory in tests) can be swapped behind
//! `Arc<dyn ...>`.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{JobStore, QueueStore};
pub use types::QueueEntry;

/// Type alias for a shareable JobStore instance.
pub type DynJobStore = std::sync::Arc<dyn JobStore>;

/// Type alias for a shareable QueueStore instance.
pub type DynQueueStore = std::sync::Arc<dyn QueueStore>;
