//! In-memory `JobStore` backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use claimflow_core::{Aco, Beneficiary, ExportJob, JobKey, JobStatus};
use claimflow_storage::{JobStore, StorageError};

#[derive(Default)]
struct JobState {
    jobs: HashMap<i64, ExportJob>,
    acos: HashMap<Uuid, Aco>,
    beneficiaries: HashMap<i64, Beneficiary>,
    job_keys: Vec<JobKey>,
}

/// In-memory `JobStore` guarded by a single mutex. Critical sections never
/// hold the lock across an await point.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<JobState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobState> {
        // Lock poisoning only happens when a holder panicked; the state is
        // plain data, so keep serving it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a parent job.
    pub fn insert_job(&self, job: ExportJob) {
        self.lock().jobs.insert(job.id, job);
    }

    /// Seed a tenant.
    pub fn insert_aco(&self, aco: Aco) {
        self.lock().acos.insert(aco.id, aco);
    }

    /// Seed a beneficiary lookup row.
    pub fn insert_beneficiary(&self, beneficiary: Beneficiary) {
        self.lock().beneficiaries.insert(beneficiary.id, beneficiary);
    }

    /// Overwrite a job's status out-of-band, the way an external canceller
    /// would.
    pub fn set_job_status(&self, id: i64, status: JobStatus) {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(&id) {
            job.status = status;
            job.updated_at = Utc::now();
        }
    }

    /// Snapshot a job, if present.
    pub fn job(&self, id: i64) -> Option<ExportJob> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Snapshot the completion keys recorded for a job.
    pub fn job_keys(&self, id: i64) -> Vec<JobKey> {
        self.lock()
            .job_keys
            .iter()
            .filter(|k| k.job_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_job_by_id(&self, id: i64) -> Result<ExportJob, StorageError> {
        self.lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::job_not_found(id))
    }

    async fn get_aco_by_uuid(&self, id: Uuid) -> Result<Aco, StorageError> {
        self.lock()
            .acos
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::aco_not_found(id.to_string()))
    }

    async fn update_job_status(
        &self,
        id: i64,
        new_status: JobStatus,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StorageError::job_not_found(id))?;
        job.status = new_status;
        job.updated_at = Utc::now();
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

        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == expected => {
                job.status = new_status;
                job.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(StorageError::job_not_updated(id, expected.to_string())),
        }
    }

    async fn create_job_key(&self, key: JobKey) -> Result<(), StorageError> {
        let mut state = self.lock();
        // Re-delivery after a crash may insert the same key twice; keep the
        // first row.
        let exists = state
            .job_keys
            .iter()
            .any(|k| k.job_id == key.job_id && k.file_name == key.file_name);
        if !exists {
            state.job_keys.push(key);
        }
        Ok(())
    }

    async fn get_job_key_count(&self, id: i64) -> Result<i64, StorageError> {
        Ok(self.lock().job_keys.iter().filter(|k| k.job_id == id).count() as i64)
    }

    async fn increment_completed_job_count(&self, id: i64) -> Result<(), StorageError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StorageError::job_not_found(id))?;
        // Advisory counter; saturates so re-deliveries cannot push it past
        // the entry total.
        job.completed_job_count = (job.completed_job_count + 1).min(job.job_count);
        Ok(())
    }

    async fn get_beneficiary_by_id(&self, id: i64) -> Result<Beneficiary, StorageError> {
        self.lock()
            .beneficiaries
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::beneficiary_not_found(id))
    }
}
