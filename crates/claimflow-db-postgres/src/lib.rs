//! PostgreSQL store backends for claimflow.
//!
//! Implements the `JobStore` and `QueueStore` traits from
//! `claimflow-storage` over a shared `sqlx` connection pool. Queue claiming
//! uses `FOR UPDATE SKIP LOCKED` so concurrent consumers never hand the same
//! entry to two workers, and the retry schedule is computed in SQL with the
//! superlinear `error_count^4 + 3s` backoff.

pub mod config;
pub mod error;
pub mod job_store;
pub mod pool;
pub mod queue_store;
pub mod schema;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use job_store::PgJobStore;
pub use pool::create_pool;
pub use queue_store::PgQueueStore;
pub use schema::run_migrations;
