//! End-to-end worker scenarios over the in-memory store backends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use claimflow_core::{Aco, Beneficiary, ClaimsWindow, ExportJob, JobArgs, JobStatus};
use claimflow_db_memory::{MemoryJobStore, MemoryQueueStore, QueueStore};
use claimflow_storage::QueueEntry;
use claimflow_upstream::{Bundle, UpstreamClient, UpstreamClientFactory, UpstreamError};
use claimflow_worker::{
    Disposition, NoopMetricsSink, QueueConsumer, WorkerConfig, WorkerError, WorkerPool,
};

/// Scripted upstream: identity lookups resolve through `identities`, fetches
/// fail for ids in `fail_upstream_ids`, and every call sleeps `per_call_delay`.
#[derive(Default)]
struct MockUpstream {
    identities: HashMap<String, String>,
    fail_upstream_ids: HashSet<String>,
    per_call_delay: Duration,
}

impl MockUpstream {
    async fn fetch(&self, id: &str, resource_type: &str) -> Result<Bundle, UpstreamError> {
        if !self.per_call_delay.is_zero() {
            tokio::time::sleep(self.per_call_delay).await;
        }
        if self.fail_upstream_ids.contains(id) {
            return Err(UpstreamError::other(format!("synthetic failure for {id}")));
        }
        Ok(Bundle::from_resources([json!({
            "resourceType": resource_type,
            "id": id,
        })]))
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn get_coverage(
        &self,
        upstream_bene_id: &str,
        _job_id: i64,
        _cms_id: &str,
        _since: Option<DateTime<Utc>>,
        _transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError> {
        self.fetch(upstream_bene_id, "Coverage").await
    }

    async fn get_patient(
        &self,
        upstream_bene_id: &str,
        _job_id: i64,
        _cms_id: &str,
        _since: Option<DateTime<Utc>>,
        _transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError> {
        self.fetch(upstream_bene_id, "Patient").await
    }

    async fn get_explanation_of_benefit(
        &self,
        upstream_bene_id: &str,
        _job_id: i64,
        _cms_id: &str,
        _since: Option<DateTime<Utc>>,
        _transaction_time: DateTime<Utc>,
        _claims_window: ClaimsWindow,
    ) -> Result<Bundle, UpstreamError> {
        self.fetch(upstream_bene_id, "ExplanationOfBenefit").await
    }

    async fn lookup_upstream_id(&self, mbi: &str) -> Result<String, UpstreamError> {
        self.identities
            .get(mbi)
            .cloned()
            .ok_or_else(|| UpstreamError::identity_not_found(mbi))
    }
}

struct MockFactory(Arc<MockUpstream>);

impl UpstreamClientFactory for MockFactory {
    fn create(&self, _base_path: &str) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
        Ok(self.0.clone())
    }
}

struct Harness {
    jobs: Arc<MemoryJobStore>,
    queue: Arc<MemoryQueueStore>,
    consumer: QueueConsumer,
    staging: TempDir,
    payload: TempDir,
}

fn harness(upstream: MockUpstream, poll_interval: Duration) -> Harness {
    let staging = tempfile::tempdir().unwrap();
    let payload = tempfile::tempdir().unwrap();

    let config = Arc::new(
        WorkerConfig::default()
            .with_dirs(staging.path(), payload.path())
            .with_status_poll_interval(poll_interval),
    );

    let jobs = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryQueueStore::new());
    let consumer = QueueConsumer::new(
        jobs.clone(),
        queue.clone(),
        Arc::new(MockFactory(Arc::new(upstream))),
        Arc::new(NoopMetricsSink),
        config,
    );

    Harness {
        jobs,
        queue,
        consumer,
        staging,
        payload,
    }
}

fn seed_job(id: i64, aco_id: Uuid, job_count: i64) -> ExportJob {
    ExportJob {
        id,
        aco_id,
        status: JobStatus::Pending,
        job_count,
        completed_job_count: 0,
        transaction_time: Utc::now(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn seed_aco() -> Aco {
    Aco {
        id: Uuid::new_v4(),
        cms_id: "A9999".to_string(),
        name: "Test ACO".to_string(),
    }
}

fn job_args(job_id: i64, aco_id: Uuid, resource_type: &str, bene_ids: &[&str]) -> JobArgs {
    serde_json::from_value(json!({
        "job_id": job_id,
        "aco_id": aco_id.to_string(),
        "resource_type": resource_type,
        "beneficiary_ids": bene_ids,
        "upstream_base_path": "/v2/fhir",
        "transaction_time": "2024-06-01T00:00:00Z",
    }))
    .unwrap()
}

async fn enqueue(harness: &Harness, args: &JobArgs) -> QueueEntry {
    harness
        .queue
        .enqueue(&args.encode().unwrap(), 0)
        .await
        .unwrap();
    harness.queue.dequeue().await.unwrap().unwrap()
}

fn payload_files(harness: &Harness, job_id: i64) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(harness.payload.path().join(job_id.to_string())) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn happy_path_single_entry_completes_job() {
    let aco = seed_aco();
    let upstream = MockUpstream {
        identities: HashMap::from([("MBI42".to_string(), "p42".to_string())]),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(1, aco.id, 1));
    h.jobs.insert_beneficiary(Beneficiary::new(42, "MBI42"));

    let entry = enqueue(&h, &job_args(1, aco.id, "Patient", &["42"])).await;
    h.consumer.process_entry(&entry).await;

    let job = h.jobs.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_job_count, 1);

    let keys = h.jobs.job_keys(1);
    assert_eq!(keys.len(), 1);
    assert!(keys[0].file_name.ends_with(".ndjson"));

    // One fully written NDJSON file in the payload directory, staging gone.
    let files = payload_files(&h, 1);
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content, "{\"id\":\"p42\",\"resourceType\":\"Patient\"}\n");
    assert!(!h.staging.path().join("1").exists());

    // Entry was acked.
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn ndjson_lines_follow_beneficiary_input_order() {
    let aco = seed_aco();
    let upstream = MockUpstream {
        identities: HashMap::from([
            ("MBI7".to_string(), "p7".to_string()),
            ("MBI3".to_string(), "p3".to_string()),
            ("MBI5".to_string(), "p5".to_string()),
        ]),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(1, aco.id, 1));
    for id in [7, 3, 5] {
        h.jobs
            .insert_beneficiary(Beneficiary::new(id, format!("MBI{id}")));
    }

    // Input order is not sorted; output must match it exactly.
    let entry = enqueue(&h, &job_args(1, aco.id, "Patient", &["7", "3", "5"])).await;
    h.consumer.process_entry(&entry).await;

    let files = payload_files(&h, 1);
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    let ids: Vec<String> = content
        .lines()
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["p7", "p3", "p5"]);
}

#[tokio::test]
async fn cancellation_mid_flight_acks_without_promotion() {
    let aco = seed_aco();
    let bene_count = 400;
    let mut identities = HashMap::new();
    for i in 0..bene_count {
        identities.insert(format!("MBI{i}"), format!("p{i}"));
    }
    let upstream = MockUpstream {
        identities,
        per_call_delay: Duration::from_millis(10),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_millis(25));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(1, aco.id, 1));
    let bene_ids: Vec<String> = (0..bene_count)
        .map(|i| {
            h.jobs
                .insert_beneficiary(Beneficiary::new(i, format!("MBI{i}")));
            i.to_string()
        })
        .collect();
    let bene_refs: Vec<&str> = bene_ids.iter().map(String::as_str).collect();

    let entry = enqueue(&h, &job_args(1, aco.id, "Patient", &bene_refs)).await;

    let consumer = h.consumer.clone();
    let task = {
        let entry = entry.clone();
        tokio::spawn(async move { consumer.process_entry(&entry).await })
    };

    // Let the streaming loop get going, then cancel externally.
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.jobs.set_job_status(1, JobStatus::Cancelled);

    tokio::time::timeout(Duration::from_secs(30), task)
        .await
        .expect("worker did not observe cancellation")
        .unwrap();

    // Acked, no completion key, no promotion, status untouched.
    assert_eq!(h.queue.depth().await.unwrap(), 0);
    assert!(h.jobs.job_keys(1).is_empty());
    assert_eq!(h.jobs.job(1).unwrap().status, JobStatus::Cancelled);
    assert!(payload_files(&h, 1).is_empty());
}

#[tokio::test]
async fn threshold_breach_fails_parent_and_writes_error_artifact() {
    let aco = seed_aco();
    // Beneficiaries 1..=6 fail upstream; with the default 50% threshold the
    // loop stops on the fifth failure.
    let upstream = MockUpstream {
        fail_upstream_ids: (1..=6).map(|i| format!("p{i}")).collect(),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(1, aco.id, 1));
    let bene_ids: Vec<String> = (1..=10)
        .map(|i| {
            h.jobs.insert_beneficiary(
                Beneficiary::new(i, format!("MBI{i}")).with_upstream_id(format!("p{i}")),
            );
            i.to_string()
        })
        .collect();
    let bene_refs: Vec<&str> = bene_ids.iter().map(String::as_str).collect();

    let entry = enqueue(&h, &job_args(1, aco.id, "Patient", &bene_refs)).await;
    h.consumer.process_entry(&entry).await;

    assert_eq!(h.jobs.job(1).unwrap().status, JobStatus::Failed);
    assert!(h.jobs.job_keys(1).is_empty());
    assert_eq!(h.queue.depth().await.unwrap(), 0);
    assert!(payload_files(&h, 1).is_empty());

    // The error artifact stays in staging with one OperationOutcome per
    // failed beneficiary observed before the threshold tripped.
    let staged: Vec<_> = std::fs::read_dir(h.staging.path().join("1"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    let error_file = staged
        .iter()
        .find(|p| p.to_string_lossy().ends_with("-error.ndjson"))
        .expect("error artifact missing");
    let content = std::fs::read_to_string(error_file).unwrap();
    let outcomes: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(outcomes.len() >= 5);
    assert!(outcomes
        .iter()
        .all(|o| o["resourceType"] == "OperationOutcome"));
}

#[tokio::test]
async fn missing_parent_retries_until_budget_exhausted() {
    let aco_id = Uuid::new_v4();
    let h = harness(MockUpstream::default(), Duration::from_secs(15));
    let args = job_args(77, aco_id, "Coverage", &["1"]);

    // Fresh entry: under budget, rescheduled.
    let entry = QueueEntry::new(1, args.encode().unwrap());
    match h.consumer.handle_entry(&entry).await {
        Disposition::Retry(WorkerError::ParentJobNotFound(77)) => {}
        other => panic!("expected not-found retry, got {other:?}"),
    }

    // Budget exhausted: acked with an error log.
    let mut spent = QueueEntry::new(2, args.encode().unwrap());
    spent.error_count = 3;
    assert!(matches!(
        h.consumer.handle_entry(&spent).await,
        Disposition::Ack
    ));
}

#[tokio::test]
async fn corrupt_payload_is_acked_without_mutation() {
    let h = harness(MockUpstream::default(), Duration::from_secs(15));
    h.jobs.insert_job(seed_job(1, Uuid::new_v4(), 1));

    let entry = QueueEntry::new(1, b"{invalid_json".to_vec());
    assert!(matches!(
        h.consumer.handle_entry(&entry).await,
        Disposition::Ack
    ));

    let job = h.jobs.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.completed_job_count, 0);
    assert!(h.jobs.job_keys(1).is_empty());
}

#[tokio::test]
async fn blank_output_records_sentinel_key_and_completes() {
    let aco = seed_aco();
    let h = harness(MockUpstream::default(), Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(9, aco.id, 1));

    let entry = enqueue(&h, &job_args(9, aco.id, "ExplanationOfBenefit", &[])).await;
    h.consumer.process_entry(&entry).await;

    let keys = h.jobs.job_keys(9);
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].file_name, "blank.ndjson");
    assert_eq!(h.jobs.job(9).unwrap().status, JobStatus::Completed);
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn multi_entry_job_completes_only_after_last_key() {
    let aco = seed_aco();
    let upstream = MockUpstream {
        identities: HashMap::from([
            ("MBI1".to_string(), "p1".to_string()),
            ("MBI2".to_string(), "p2".to_string()),
        ]),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(3, aco.id, 2));
    h.jobs.insert_beneficiary(Beneficiary::new(1, "MBI1"));
    h.jobs.insert_beneficiary(Beneficiary::new(2, "MBI2"));

    let first = enqueue(&h, &job_args(3, aco.id, "Coverage", &["1"])).await;
    h.consumer.process_entry(&first).await;

    // One of two slices done: still in progress, nothing promoted.
    assert_eq!(h.jobs.job(3).unwrap().status, JobStatus::InProgress);
    assert_eq!(h.jobs.job_keys(3).len(), 1);
    assert!(payload_files(&h, 3).is_empty());

    let second = enqueue(&h, &job_args(3, aco.id, "Coverage", &["2"])).await;
    h.consumer.process_entry(&second).await;

    let job = h.jobs.job(3).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.jobs.job_keys(3).len(), 2);
    assert!(job.completed_job_count <= job.job_count);
    assert_eq!(payload_files(&h, 3).len(), 2);
    assert!(!h.staging.path().join("3").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_of_one_parent_promote_exactly_once() {
    let aco = seed_aco();
    let mut identities = HashMap::new();
    for i in 1..=6 {
        identities.insert(format!("MBI{i}"), format!("p{i}"));
    }
    let upstream = MockUpstream {
        identities,
        per_call_delay: Duration::from_millis(5),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_job(seed_job(4, aco.id, 2));
    for i in 1..=6 {
        h.jobs
            .insert_beneficiary(Beneficiary::new(i, format!("MBI{i}")));
    }

    // Two slices of the same parent, raced by two consumers so both can
    // observe the full key count and promote at the same time.
    let first = enqueue(&h, &job_args(4, aco.id, "Patient", &["1", "2", "3"])).await;
    let second = enqueue(&h, &job_args(4, aco.id, "Patient", &["4", "5", "6"])).await;

    let tasks = [first, second].map(|entry| {
        let consumer = h.consumer.clone();
        tokio::spawn(async move { consumer.process_entry(&entry).await })
    });
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(30), task)
            .await
            .expect("entry did not finish")
            .unwrap();
    }

    let job = h.jobs.job(4).unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // Exactly one key per entry, never inflated by the completion race.
    let keys = h.jobs.job_keys(4);
    assert_eq!(keys.len() as i64, job.job_count);
    assert!(job.completed_job_count <= job.job_count);

    // Both artifacts promoted, staging drained, both entries acked.
    assert_eq!(payload_files(&h, 4).len(), 2);
    assert!(!h.staging.path().join("4").exists());
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn pool_drains_entries_and_stops_cleanly() {
    let aco = seed_aco();
    let upstream = MockUpstream {
        identities: HashMap::from([("MBI1".to_string(), "p1".to_string())]),
        ..Default::default()
    };
    let h = harness(upstream, Duration::from_secs(15));

    h.jobs.insert_aco(aco.clone());
    h.jobs.insert_beneficiary(Beneficiary::new(1, "MBI1"));
    for job_id in 1..=3 {
        h.jobs.insert_job(seed_job(job_id, aco.id, 1));
        let args = job_args(job_id, aco.id, "Patient", &["1"]);
        h.queue.enqueue(&args.encode().unwrap(), 0).await.unwrap();
    }

    let pool = WorkerPool::start(h.consumer.clone(), 2);

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if h.queue.depth().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pool did not drain the queue");

    pool.stop().await;

    for job_id in 1..=3 {
        assert_eq!(h.jobs.job(job_id).unwrap().status, JobStatus::Completed);
    }
}
