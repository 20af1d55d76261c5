use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::BatchId;
use super::file_meta::FileKey;
use super::project::ProjectId;

/// What a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemType {
    /// Metadata ingestion from a walk.
    Meta,
    /// Content transfer of one file.
    Content,
}

impl std::fmt::Display for QueueItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemType::Meta => write!(f, "meta"),
            QueueItemType::Content => write!(f, "content"),
        }
    }
}

impl std::str::FromStr for QueueItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(QueueItemType::Meta),
            "content" => Ok(QueueItemType::Content),
            _ => Err(format!("unknown queue item type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            _ => Err(format!("unknown queue status: {s}")),
        }
    }
}

/// A persisted unit of sync work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub item_type: QueueItemType,
    pub file: Option<FileKey>,
    pub batch_id: Option<BatchId>,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncQueueItem {
    pub fn new(project_id: ProjectId, item_type: QueueItemType, max_attempts: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            project_id,
            item_type,
            file: None,
            batch_id: None,
            priority: 0,
            attempts: 0,
            max_attempts,
            status: QueueStatus::Pending,
            created_at: Utc::now(),
            last_attempt: None,
            error_message: None,
        }
    }

    /// A content item for one file inside a batch, already marked `processing`.
    pub fn for_transfer(file: FileKey, batch_id: BatchId, max_attempts: u32) -> Self {
        let mut item = Self::new(file.project_id.clone(), QueueItemType::Content, max_attempts);
        item.file = Some(file);
        item.batch_id = Some(batch_id);
        item.status = QueueStatus::Processing;
        item.attempts = 1;
        item.last_attempt = Some(Utc::now());
        item
    }
}
