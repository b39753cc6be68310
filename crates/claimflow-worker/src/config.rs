//! Worker configuration, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-entry failure threshold, in percent.
const DEFAULT_EXPORT_FAIL_PCT: u8 = 50;

/// Default retry budget for entries whose parent job cannot be found yet.
/// Deliberately generous: combined with the queue's superlinear backoff it
/// outlasts any legitimate admission latency.
const DEFAULT_MAX_JOB_NOT_FOUND_RETRIES: i32 = 3;

const DEFAULT_WORKER_COUNT: usize = 4;

/// Cadence at which the cancellation monitor re-reads the parent status.
const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Runtime configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for in-progress artifacts (`<staging_dir>/<job_id>/...`).
    pub staging_dir: PathBuf,

    /// Root for published artifacts, populated by rename at commit.
    pub payload_dir: PathBuf,

    /// Per-entry failure threshold percent, clamped to `[0, 100]`.
    pub export_fail_pct: u8,

    /// Attempts allowed before acking an entry whose parent is missing.
    pub max_job_not_found_retries: i32,

    /// Metric emission is enabled only when this is non-empty.
    pub deployment_target: Option<String>,

    /// Number of concurrent queue consumers.
    pub worker_count: usize,

    /// Cancellation monitor poll cadence. Tests shorten this.
    pub status_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("data/staging"),
            payload_dir: PathBuf::from("data/payload"),
            export_fail_pct: DEFAULT_EXPORT_FAIL_PCT,
            max_job_not_found_retries: DEFAULT_MAX_JOB_NOT_FOUND_RETRIES,
            deployment_target: None,
            worker_count: DEFAULT_WORKER_COUNT,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from the recognized environment variables:
    /// `STAGING_DIR`, `PAYLOAD_DIR`, `EXPORT_FAIL_PCT`,
    /// `MAX_JOB_NOT_FOUND_RETRIES`, `DEPLOYMENT_TARGET`, `WORKER_COUNT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            staging_dir: env_var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            payload_dir: env_var("PAYLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.payload_dir),
            export_fail_pct: parse_fail_pct(env_var("EXPORT_FAIL_PCT")),
            max_job_not_found_retries: env_var("MAX_JOB_NOT_FOUND_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_JOB_NOT_FOUND_RETRIES),
            deployment_target: env_var("DEPLOYMENT_TARGET"),
            worker_count: env_var("WORKER_COUNT")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_WORKER_COUNT),
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
        }
    }

    /// The failure threshold as a percentage.
    pub fn fail_threshold(&self) -> f64 {
        f64::from(self.export_fail_pct)
    }

    /// Sets the artifact roots.
    #[must_use]
    pub fn with_dirs(mut self, staging: impl Into<PathBuf>, payload: impl Into<PathBuf>) -> Self {
        self.staging_dir = staging.into();
        self.payload_dir = payload.into();
        self
    }

    /// Sets the failure threshold percent (clamped to `[0, 100]`).
    #[must_use]
    pub fn with_export_fail_pct(mut self, pct: i64) -> Self {
        self.export_fail_pct = pct.clamp(0, 100) as u8;
        self
    }

    /// Sets the cancellation monitor poll cadence.
    #[must_use]
    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }

    /// Sets the deployment target tag (empty disables metric emission).
    #[must_use]
    pub fn with_deployment_target(mut self, target: impl Into<String>) -> Self {
        let target: String = target.into();
        self.deployment_target = (!target.is_empty()).then_some(target);
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_fail_pct(raw: Option<String>) -> u8 {
    match raw.and_then(|s| s.parse::<i64>().ok()) {
        Some(pct) => pct.clamp(0, 100) as u8,
        None => DEFAULT_EXPORT_FAIL_PCT,
    }
}
