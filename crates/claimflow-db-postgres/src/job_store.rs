//! PostgreSQL `JobStore` backend.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use claimflow_core::{Aco, Beneficiary, ExportJob, JobKey, JobStatus};
use claimflow_storage::{JobStore, StorageError};

use crate::error::storage_err;

/// `JobStore` over a shared `sqlx` pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<ExportJob, StorageError> {
    let status_str: String = row.try_get("status").map_err(storage_err)?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        StorageError::internal(format!("unknown job status in database: {status_str}"))
    })?;

    Ok(ExportJob {
        id: row.try_get("id").map_err(storage_err)?,
        aco_id: row.try_get("aco_id").map_err(storage_err)?,
        status,
        job_count: row.try_get("job_count").map_err(storage_err)?,
        completed_job_count: row.try_get("completed_job_count").map_err(storage_err)?,
        transaction_time: row.try_get("transaction_time").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get_job_by_id(&self, id: i64) -> Result<ExportJob, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, aco_id, status, job_count, completed_job_count,
                   transaction_time, created_at, updated_at
            FROM export_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| StorageError::job_not_found(id))?;

        job_from_row(&row)
    }

    async fn get_aco_by_uuid(&self, id: Uuid) -> Result<Aco, StorageError> {
        let row = sqlx::query("SELECT id, cms_id, name FROM acos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| StorageError::aco_not_found(id.to_string()))?;

        Ok(Aco {
            id: row.try_get("id").map_err(storage_err)?,
            cms_id: row.try_get("cms_id").map_err(storage_err)?,
            name: row.try_get("name").map_err(storage_err)?,
        })
    }

    async fn update_job_status(
        &self,
        id: i64,
        new_status: JobStatus,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE export_jobs SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(new_status.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::job_not_found(id));
        }
        Ok(())
    }

    async fn update_job_status_check_status(
        &self,
        id: i64,
        expected: JobStatus,
        new_status: JobStatus,
    ) -> Result<(), StorageError> {
        // The status DAG is the gate; a transition it forbids never matches
        // a row worth updating.
        if !expected.can_transition_to(new_status) {
            return Err(StorageError::job_not_updated(id, expected.to_string()));
        }

        // Single-round compare-and-set; a miss means another worker or an
        // external cancellation advanced the status first.
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(new_status.to_string())
        .bind(id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::job_not_updated(id, expected.to_string()));
        }
        Ok(())
    }

    async fn create_job_key(&self, key: JobKey) -> Result<(), StorageError> {
        // Conflict means the key was already recorded by an earlier delivery
        // of the same entry; keep the first row.
        sqlx::query(
            r#"
            INSERT INTO job_keys (job_id, file_name, resource_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id, file_name) DO NOTHING
            "#,
        )
        .bind(key.job_id)
        .bind(&key.file_name)
        .bind(key.resource_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn get_job_key_count(&self, id: i64) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM job_keys WHERE job_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        row.try_get("count").map_err(storage_err)
    }

    async fn increment_completed_job_count(&self, id: i64) -> Result<(), StorageError> {
        // Advisory counter; saturates so re-deliveries cannot push it past
        // the entry total.
        sqlx::query(
            r#"
            UPDATE export_jobs
            SET completed_job_count = LEAST(completed_job_count + 1, job_count),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn get_beneficiary_by_id(&self, id: i64) -> Result<Beneficiary, StorageError> {
        let row = sqlx::query("SELECT id, mbi, upstream_id FROM beneficiaries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| StorageError::beneficiary_not_found(id))?;

        Ok(Beneficiary {
            id: row.try_get("id").map_err(storage_err)?,
            mbi: row.try_get("mbi").map_err(storage_err)?,
            upstream_id: row.try_get("upstream_id").map_err(storage_err)?,
        })
    }
}
