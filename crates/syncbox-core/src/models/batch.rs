use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file_meta::FileMeta;
use super::project::ProjectId;

/// Unique identifier for an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of an upload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Uploading,
    /// Every file was attempted; some may have ended in error.
    Completed,
    /// The batch loop itself failed or was cancelled.
    Failed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Uploading => write!(f, "uploading"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "uploading" => Ok(BatchStatus::Uploading),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            _ => Err(format!("unknown batch status: {s}")),
        }
    }
}

/// A group of files uploaded together by one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub project_id: ProjectId,
    /// Fingerprint of the member paths.
    pub batch_hash: String,
    pub status: BatchStatus,
    pub file_count: u32,
    pub total_size: u64,
    pub uploaded_size: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Batch {
    /// Create an `uploading` batch sized from the files it was built from.
    pub fn from_files(project_id: ProjectId, files: &[FileMeta], batch_hash: String) -> Self {
        Self {
            id: BatchId::new(),
            project_id,
            batch_hash,
            status: BatchStatus::Uploading,
            file_count: files.len() as u32,
            total_size: files.iter().map(|f| f.size).sum(),
            uploaded_size: 0,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}
