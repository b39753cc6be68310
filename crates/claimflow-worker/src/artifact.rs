//! NDJSON artifact staging and promotion.
//!
//! Each queue entry streams into its own UUID-named artifact under
//! `<staging>/<job_id>/`; per-beneficiary failures go to a lazily created
//! `-error.ndjson` sibling. When the parent job finishes, every staged file
//! is renamed into `<payload>/<job_id>/`, so consumers of the payload
//! directory see each file either absent or fully written.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Errors that can occur while writing or promoting artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Buffered writer for one entry's staged artifact pair.
pub struct ArtifactWriter {
    artifact_id: Uuid,
    job_dir: PathBuf,
    data: BufWriter<File>,
    /// Created on first failure; most entries never have one.
    errors: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl ArtifactWriter {
    /// Opens `<staging_root>/<job_id>/<uuid>.ndjson` for buffered append.
    pub async fn create(staging_root: &Path, job_id: i64) -> Result<Self, ArtifactError> {
        let job_dir = staging_root.join(job_id.to_string());
        fs::create_dir_all(&job_dir).await?;

        let artifact_id = Uuid::new_v4();
        let file = File::create(job_dir.join(format!("{artifact_id}.ndjson"))).await?;

        Ok(Self {
            artifact_id,
            job_dir,
            data: BufWriter::new(file),
            errors: None,
            bytes_written: 0,
        })
    }

    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    /// Name of the data artifact file.
    pub fn file_name(&self) -> String {
        format!("{}.ndjson", self.artifact_id)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends one resource as a compact JSON line.
    pub async fn write_resource(&mut self, resource: &Value) -> Result<(), ArtifactError> {
        let mut line = serde_json::to_vec(resource)?;
        line.push(b'\n');
        self.data.write_all(&line).await?;
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    /// Appends one OperationOutcome document to the error sibling, creating
    /// it on first use.
    pub async fn append_error(&mut self, outcome: &Value) -> Result<(), ArtifactError> {
        if self.errors.is_none() {
            let path = self
                .job_dir
                .join(format!("{}-error.ndjson", self.artifact_id));
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await?;
            self.errors = Some(BufWriter::new(file));
        }

        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');
        if let Some(writer) = self.errors.as_mut() {
            writer.write_all(&line).await?;
        }
        Ok(())
    }

    /// Flushes both files and returns the artifact id and the number of
    /// data bytes written.
    pub async fn finish(mut self) -> Result<(Uuid, u64), ArtifactError> {
        self.data.flush().await?;
        if let Some(mut errors) = self.errors.take() {
            errors.flush().await?;
        }
        Ok((self.artifact_id, self.bytes_written))
    }
}

/// Ensures the staging and payload directories for a job exist. Idempotent.
pub async fn ensure_job_dirs(
    staging_root: &Path,
    payload_root: &Path,
    job_id: i64,
) -> Result<(), ArtifactError> {
    fs::create_dir_all(staging_root.join(job_id.to_string())).await?;
    fs::create_dir_all(payload_root.join(job_id.to_string())).await?;
    Ok(())
}

/// Renames every staged file for a job into the payload directory, then
/// removes the emptied staging directory. Returns the number of files this
/// caller moved.
///
/// Idempotent under the completion race: several entries of one parent may
/// observe the full key count at once and promote concurrently. A missing
/// staging directory, a staged file that vanished between listing and
/// rename, and a staging directory a racer is still draining are all
/// treated as the racer's work, never as an error.
pub async fn promote_artifacts(
    staging_root: &Path,
    payload_root: &Path,
    job_id: i64,
) -> Result<usize, ArtifactError> {
    let staging = staging_root.join(job_id.to_string());
    let payload = payload_root.join(job_id.to_string());

    let mut entries = match fs::read_dir(&staging).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut staged = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        staged.push(entry.file_name());
    }
    drop(entries);

    fs::create_dir_all(&payload).await?;
    let mut moved = 0;
    for name in &staged {
        match fs::rename(staging.join(name), payload.join(name)).await {
            Ok(()) => moved += 1,
            // A racing completer already moved this file.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    match fs::remove_dir(&staging).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            // Still holds files a racer is mid-rename on; whoever drains the
            // directory last removes it.
            tracing::debug!(job_id, error = %err, "Staging directory not yet empty; leaving cleanup to the racing completer");
        }
    }

    Ok(moved)
}
