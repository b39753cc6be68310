//! Per-entry processing: validation, streaming, completion bookkeeping.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use claimflow_core::{ExportJob, JobArgs, JobKey, JobStatus, ResourceKind, BLANK_FILE_NAME};
use claimflow_storage::DynJobStore;
use claimflow_upstream::outcome::issue;
use claimflow_upstream::{Bundle, OperationOutcome, UpstreamClient, UpstreamClientFactory};

use crate::artifact::{self, ArtifactError, ArtifactWriter};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::monitor::CancelToken;

/// Executes one queue entry at a time against the job store and the
/// upstream service.
#[derive(Clone)]
pub struct JobWorker {
    job_store: DynJobStore,
    upstream_factory: Arc<dyn UpstreamClientFactory>,
    config: Arc<WorkerConfig>,
}

/// One failed beneficiary: what goes into the error artifact, and the
/// underlying error for the log line.
struct BeneficiaryFailure {
    code: &'static str,
    message: String,
    detail: String,
}

impl BeneficiaryFailure {
    fn new(code: &'static str, message: String, detail: impl Into<String>) -> Self {
        Self {
            code,
            message,
            detail: detail.into(),
        }
    }
}

impl JobWorker {
    pub fn new(
        job_store: DynJobStore,
        upstream_factory: Arc<dyn UpstreamClientFactory>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            job_store,
            upstream_factory,
            config,
        }
    }

    /// Checks an entry's payload against the job store before any work is
    /// done.
    ///
    /// # Errors
    ///
    /// `MissingBasePath` and `ParentJobCancelled` mean the entry should be
    /// acked; `ParentJobNotFound` is retried within the consumer's budget.
    pub async fn validate_job(&self, args: &JobArgs) -> Result<ExportJob, WorkerError> {
        if args.upstream_base_path.is_empty() {
            return Err(WorkerError::MissingBasePath);
        }

        let job = match self.job_store.get_job_by_id(args.job_id).await {
            Ok(job) => job,
            Err(e) if e.is_job_not_found() => {
                return Err(WorkerError::ParentJobNotFound(args.job_id));
            }
            Err(e) => return Err(e.into()),
        };

        if job.status == JobStatus::Cancelled {
            return Err(WorkerError::ParentJobCancelled(job.id));
        }

        Ok(job)
    }

    /// Processes one validated entry end to end: promotes the parent out of
    /// `Pending`, streams the beneficiary slice into staged artifacts,
    /// records the completion key, and runs the completion check.
    pub async fn process_job(
        &self,
        job: &ExportJob,
        args: &JobArgs,
        cancel: &CancelToken,
    ) -> Result<(), WorkerError> {
        let aco = self.job_store.get_aco_by_uuid(job.aco_id).await?;

        match self
            .job_store
            .update_job_status_check_status(job.id, JobStatus::Pending, JobStatus::InProgress)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_updated() => {
                // Another entry for this parent advanced the status first,
                // or the job was cancelled; the monitor covers the latter.
                warn!(job_id = job.id, error = %e, "Could not promote job to in-progress; continuing");
            }
            Err(e) => return Err(e.into()),
        }

        artifact::ensure_job_dirs(&self.config.staging_dir, &self.config.payload_dir, job.id)
            .await?;

        let upstream = self.upstream_factory.create(&args.upstream_base_path)?;

        match self
            .write_upstream_data(upstream.as_ref(), &aco.cms_id, args, cancel)
            .await
        {
            Ok((artifact_id, bytes_written)) => {
                let file_name = if bytes_written == 0 {
                    warn!(
                        job_id = job.id,
                        artifact = %artifact_id,
                        "Entry produced no output; recording blank file sentinel"
                    );
                    BLANK_FILE_NAME.to_string()
                } else {
                    format!("{artifact_id}.ndjson")
                };

                self.job_store
                    .create_job_key(JobKey::new(job.id, file_name, args.resource_type))
                    .await?;
                self.finish_entry(job.id).await?;
                Ok(())
            }
            Err(stream_err) => {
                // Only in-progress jobs move to failed; a terminal status
                // (for example cancelled mid-flight) is never overwritten.
                match self
                    .job_store
                    .update_job_status_check_status(job.id, JobStatus::InProgress, JobStatus::Failed)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_updated() => {
                        warn!(job_id = job.id, "Could not mark job failed; it is already terminal");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.finish_entry(job.id).await?;
                Err(stream_err)
            }
        }
    }

    /// Completion check plus the advisory counter bump, run after every
    /// entry whether or not a key was recorded.
    async fn finish_entry(&self, job_id: i64) -> Result<(), WorkerError> {
        self.check_job_complete_and_promote(job_id).await?;

        // Advisory only; the job key count is the authoritative signal.
        if let Err(e) = self.job_store.increment_completed_job_count(job_id).await {
            warn!(job_id, error = %e, "Failed to update completed job count; continuing");
        }
        Ok(())
    }

    /// Streams every beneficiary in the slice, in input order, into this
    /// entry's staged artifact. Returns the artifact id and the number of
    /// data bytes written.
    async fn write_upstream_data(
        &self,
        upstream: &dyn UpstreamClient,
        cms_id: &str,
        args: &JobArgs,
        cancel: &CancelToken,
    ) -> Result<(Uuid, u64), WorkerError> {
        let mut writer = ArtifactWriter::create(&self.config.staging_dir, args.job_id).await?;

        let total = args.beneficiary_ids.len();
        let threshold = self.config.fail_threshold();
        let mut failed_count = 0usize;
        let mut cancelled = false;
        let mut threshold_exceeded = false;

        for bene_id in &args.beneficiary_ids {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if self
                .export_one(upstream, &mut writer, cms_id, args, bene_id)
                .await?
            {
                failed_count += 1;
            }

            let fail_pct = (failed_count as f64 / total as f64) * 100.0;
            if fail_pct >= threshold {
                threshold_exceeded = true;
                break;
            }
        }

        let (artifact_id, bytes_written) = writer.finish().await?;

        if cancelled {
            return Err(WorkerError::ParentJobCancelled(args.job_id));
        }
        if threshold_exceeded {
            return Err(WorkerError::FailureThresholdExceeded {
                job_id: args.job_id,
                failed: failed_count,
                total,
            });
        }

        Ok((artifact_id, bytes_written))
    }

    /// Exports one beneficiary. Returns `true` when the beneficiary is
    /// counted as failed. Errors here are terminal artifact I/O failures;
    /// everything beneficiary-scoped lands in the error artifact instead.
    async fn export_one(
        &self,
        upstream: &dyn UpstreamClient,
        writer: &mut ArtifactWriter,
        cms_id: &str,
        args: &JobArgs,
        bene_id: &str,
    ) -> Result<bool, ArtifactError> {
        let bundle = match self
            .fetch_for_beneficiary(upstream, cms_id, args, bene_id)
            .await
        {
            Ok(bundle) => bundle,
            Err(failure) => {
                tracing::error!(
                    job_id = args.job_id,
                    beneficiary = bene_id,
                    error = %failure.detail,
                    "{}", failure.message
                );
                writer
                    .append_error(&OperationOutcome::error(failure.code, &failure.message).to_json())
                    .await?;
                return Ok(true);
            }
        };

        let mut failed = false;
        for resource in bundle.resources() {
            if let Err(e) = writer.write_resource(resource).await {
                let message = format!(
                    "Error writing {} to file for beneficiary {} in ACO {}",
                    args.resource_type, bene_id, args.aco_id
                );
                tracing::error!(job_id = args.job_id, error = %e, "{message}");
                writer
                    .append_error(
                        &OperationOutcome::error(issue::INTERNAL_ERROR, &message).to_json(),
                    )
                    .await?;
                failed = true;
            }
        }
        Ok(failed)
    }

    /// Resolves one beneficiary's records from the upstream service.
    async fn fetch_for_beneficiary(
        &self,
        upstream: &dyn UpstreamClient,
        cms_id: &str,
        args: &JobArgs,
        bene_id: &str,
    ) -> Result<Bundle, BeneficiaryFailure> {
        let id = bene_id
            .parse::<u64>()
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| {
                BeneficiaryFailure::new(
                    issue::UPSTREAM_ERROR,
                    format!("Error failed to parse beneficiary id {bene_id}"),
                    "not an unsigned integer",
                )
            })?;

        let bene = self.job_store.get_beneficiary_by_id(id).await.map_err(|e| {
            BeneficiaryFailure::new(
                issue::UPSTREAM_ERROR,
                format!("Error retrieving beneficiary record for id {id}"),
                e.to_string(),
            )
        })?;

        // Resolve and cache the upstream identity for this record.
        let bene = match bene.upstream_id {
            Some(_) => bene,
            None => {
                let upstream_id =
                    upstream.lookup_upstream_id(&bene.mbi).await.map_err(|e| {
                        BeneficiaryFailure::new(
                            issue::UPSTREAM_ERROR,
                            format!(
                                "Error resolving upstream identity for beneficiary MBI {}",
                                bene.mbi
                            ),
                            e.to_string(),
                        )
                    })?;
                bene.with_upstream_id(upstream_id)
            }
        };
        let upstream_id = bene.upstream_id.as_deref().unwrap_or_default();

        let result = match args.resource_type {
            ResourceKind::Coverage => {
                upstream
                    .get_coverage(
                        upstream_id,
                        args.job_id,
                        cms_id,
                        args.since,
                        args.transaction_time,
                    )
                    .await
            }
            ResourceKind::Patient => {
                upstream
                    .get_patient(
                        upstream_id,
                        args.job_id,
                        cms_id,
                        args.since,
                        args.transaction_time,
                    )
                    .await
            }
            ResourceKind::ExplanationOfBenefit => {
                upstream
                    .get_explanation_of_benefit(
                        upstream_id,
                        args.job_id,
                        cms_id,
                        args.since,
                        args.transaction_time,
                        args.effective_claims_window(),
                    )
                    .await
            }
        };

        result.map_err(|e| {
            BeneficiaryFailure::new(
                issue::UPSTREAM_ERROR,
                format!(
                    "Error retrieving {} for beneficiary MBI {} in ACO {}",
                    args.resource_type, bene.mbi, args.aco_id
                ),
                e.to_string(),
            )
        })
    }

    /// Checks whether every entry of the parent has reported in and, if so,
    /// publishes the staged artifacts and marks the job completed.
    ///
    /// Several entries may observe the full key count at once; promotion is
    /// idempotent, so the race is harmless. Returns `true` when the parent
    /// is (already) terminal.
    pub async fn check_job_complete_and_promote(&self, job_id: i64) -> Result<bool, WorkerError> {
        let job = self.job_store.get_job_by_id(job_id).await?;

        match job.status {
            JobStatus::Completed => return Ok(true),
            JobStatus::Cancelled | JobStatus::Failed => {
                // Terminal non-success: no promotion, no status change.
                warn!(job_id, status = %job.status, "Parent job already terminal; skipping promotion");
                return Ok(true);
            }
            JobStatus::Pending | JobStatus::InProgress => {}
        }

        let key_count = self.job_store.get_job_key_count(job_id).await?;
        if key_count < job.job_count {
            return Ok(false);
        }

        let moved = artifact::promote_artifacts(
            &self.config.staging_dir,
            &self.config.payload_dir,
            job_id,
        )
        .await?;

        self.job_store
            .update_job_status(job_id, JobStatus::Completed)
            .await?;

        info!(job_id, files = moved, "Export job completed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use claimflow_core::{ClaimsWindow, ExportJob};
    use claimflow_db_memory::{JobStore, MemoryJobStore};
    use claimflow_upstream::{Bundle, UpstreamError};

    use super::*;

    struct UnusedClient;

    #[async_trait]
    impl UpstreamClient for UnusedClient {
        async fn get_coverage(
            &self,
            _upstream_bene_id: &str,
            _job_id: i64,
            _cms_id: &str,
            _since: Option<DateTime<Utc>>,
            _transaction_time: DateTime<Utc>,
        ) -> Result<Bundle, UpstreamError> {
            Err(UpstreamError::other("unused"))
        }

        async fn get_patient(
            &self,
            _upstream_bene_id: &str,
            _job_id: i64,
            _cms_id: &str,
            _since: Option<DateTime<Utc>>,
            _transaction_time: DateTime<Utc>,
        ) -> Result<Bundle, UpstreamError> {
            Err(UpstreamError::other("unused"))
        }

        async fn get_explanation_of_benefit(
            &self,
            _upstream_bene_id: &str,
            _job_id: i64,
            _cms_id: &str,
            _since: Option<DateTime<Utc>>,
            _transaction_time: DateTime<Utc>,
            _claims_window: ClaimsWindow,
        ) -> Result<Bundle, UpstreamError> {
            Err(UpstreamError::other("unused"))
        }

        async fn lookup_upstream_id(&self, _mbi: &str) -> Result<String, UpstreamError> {
            Err(UpstreamError::other("unused"))
        }
    }

    struct UnusedFactory;

    impl UpstreamClientFactory for UnusedFactory {
        fn create(
            &self,
            _base_path: &str,
        ) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
            Ok(Arc::new(UnusedClient))
        }
    }

    fn worker_with(store: Arc<MemoryJobStore>) -> JobWorker {
        JobWorker::new(store, Arc::new(UnusedFactory), Arc::new(WorkerConfig::default()))
    }

    fn seed_job(id: i64, status: JobStatus) -> ExportJob {
        ExportJob {
            id,
            aco_id: Uuid::new_v4(),
            status,
            job_count: 1,
            completed_job_count: 0,
            transaction_time: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn args_for(job_id: i64, base_path: &str) -> JobArgs {
        serde_json::from_value(serde_json::json!({
            "job_id": job_id,
            "aco_id": Uuid::new_v4().to_string(),
            "resource_type": "Patient",
            "beneficiary_ids": [],
            "upstream_base_path": base_path,
            "transaction_time": "2024-06-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_base_path() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert_job(seed_job(1, JobStatus::Pending));
        let worker = worker_with(store);

        let err = worker.validate_job(&args_for(1, "")).await.unwrap_err();
        assert!(matches!(err, WorkerError::MissingBasePath));
    }

    #[tokio::test]
    async fn test_validate_maps_missing_parent() {
        let store = Arc::new(MemoryJobStore::new());
        let worker = worker_with(store);

        let err = worker
            .validate_job(&args_for(99, "/v2/fhir"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ParentJobNotFound(99)));
    }

    #[tokio::test]
    async fn test_validate_rejects_cancelled_parent() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert_job(seed_job(5, JobStatus::Cancelled));
        let worker = worker_with(store);

        let err = worker
            .validate_job(&args_for(5, "/v2/fhir"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ParentJobCancelled(5)));
    }

    #[tokio::test]
    async fn test_completion_check_is_noop_for_terminal_job() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert_job(seed_job(7, JobStatus::Failed));
        let worker = worker_with(store.clone());

        assert!(worker.check_job_complete_and_promote(7).await.unwrap());
        assert_eq!(store.job(7).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_completion_check_waits_for_all_keys() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = seed_job(8, JobStatus::InProgress);
        job.job_count = 2;
        store.insert_job(job);
        store
            .create_job_key(JobKey::new(8, "a.ndjson", ResourceKind::Patient))
            .await
            .unwrap();
        let worker = worker_with(store.clone());

        assert!(!worker.check_job_complete_and_promote(8).await.unwrap());
        assert_eq!(store.job(8).unwrap().status, JobStatus::InProgress);
    }
}
