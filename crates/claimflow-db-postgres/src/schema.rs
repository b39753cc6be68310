//! Schema bootstrap for the claimflow tables.
//!
//! Applied only when `PostgresConfig::run_migrations` is set. Every
//! statement is idempotent, so repeated startups are safe.

use sqlx::postgres::PgPool;
use tracing::info;

use crate::error::{PostgresError, Result};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS acos (
        id UUID PRIMARY KEY,
        cms_id TEXT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS export_jobs (
        id BIGSERIAL PRIMARY KEY,
        aco_id UUID NOT NULL REFERENCES acos (id),
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'cancelled', 'failed', 'completed')),
        job_count BIGINT NOT NULL DEFAULT 0,
        completed_job_count BIGINT NOT NULL DEFAULT 0,
        transaction_time TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_keys (
        job_id BIGINT NOT NULL REFERENCES export_jobs (id) ON DELETE CASCADE,
        file_name TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (job_id, file_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS beneficiaries (
        id BIGSERIAL PRIMARY KEY,
        mbi TEXT NOT NULL,
        upstream_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queue_jobs (
        id BIGSERIAL PRIMARY KEY,
        payload BYTEA NOT NULL,
        priority SMALLINT NOT NULL DEFAULT 0,
        error_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        visible_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        locked_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_queue_jobs_ready
        ON queue_jobs (priority DESC, id)
        WHERE locked_at IS NULL
    "#,
];

/// Applies the schema bootstrap.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::Migration(e.to_string()))?;
    }

    info!(statements = STATEMENTS.len(), "Schema bootstrap applied");

    Ok(())
}
