//! PostgreSQL `QueueStore` backend.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent consumers never
//! receive the same entry. A claimed entry is stamped `locked_at`; the stamp
//! expires after [`LOCK_TIMEOUT_MINUTES`] so entries held by a crashed
//! worker become visible again.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use claimflow_storage::{QueueEntry, QueueStore, StorageError};

use crate::error::storage_err;

/// A claim older than this is considered abandoned.
const LOCK_TIMEOUT_MINUTES: i32 = 15;

/// `QueueStore` over a shared `sqlx` pool.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn enqueue(&self, payload: &[u8], priority: i16) -> Result<i64, StorageError> {
        let row = sqlx::query(
            r#"
            INSERT INTO queue_jobs (payload, priority)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(payload)
        .bind(priority)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        row.try_get("id").map_err(storage_err)
    }

    async fn dequeue(&self) -> Result<Option<QueueEntry>, StorageError> {
        let row = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET locked_at = NOW()
            WHERE id = (
                SELECT id
                FROM queue_jobs
                WHERE visible_at <= NOW()
                  AND (locked_at IS NULL
                       OR locked_at < NOW() - make_interval(mins => $1))
                ORDER BY priority DESC, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, error_count, visible_at
            "#,
        )
        .bind(LOCK_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(row) => Ok(Some(QueueEntry {
                id: row.try_get("id").map_err(storage_err)?,
                payload: row.try_get("payload").map_err(storage_err)?,
                error_count: row.try_get("error_count").map_err(storage_err)?,
                visible_at: row.try_get("visible_at").map_err(storage_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
            .bind(entry.id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn retry(&self, entry: &QueueEntry, error: &str) -> Result<(), StorageError> {
        // Backoff computed in SQL over the incremented count:
        // error_count^4 + 3 seconds.
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET error_count = error_count + 1,
                last_error = $2,
                visible_at = NOW() + make_interval(secs => power(error_count + 1, 4) + 3),
                locked_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn depth(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM queue_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        row.try_get("count").map_err(storage_err)
    }

    async fn wait_available(&self, fallback: Duration) {
        // Cross-process queue: no in-process wakeup, rely on the fallback
        // poll interval.
        tokio::time::sleep(fallback).await;
    }
}
