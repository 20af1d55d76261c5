use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::project::ProjectId;

/// Primary key of a tracked file: the owning project plus its relative path.
///
/// Kept as a tuple rather than a joined string so a `:` or `/` inside either
/// component can never collide with another key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub project_id: ProjectId,
    pub path: String,
}

impl FileKey {
    pub fn new(project_id: ProjectId, path: impl Into<String>) -> Self {
        Self {
            project_id,
            path: path.into(),
        }
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.path)
    }
}

/// Upload state of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Recorded by the walker, waiting to be claimed by a batch.
    Pending,
    /// Claimed by a batch; transfer may be in flight or was interrupted.
    Uploading,
    /// The remote acknowledged the full content.
    Uploaded,
    /// The upload was committed into the remote project.
    Committed,
    /// The last transfer attempt failed.
    Error,
}

impl FileStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// The reachable edges are `pending -> uploading`, `uploading -> uploaded`,
    /// `uploading -> error`, `uploaded -> committed` and `error -> pending`.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Uploading)
                | (FileStatus::Uploading, FileStatus::Uploaded)
                | (FileStatus::Uploading, FileStatus::Error)
                | (FileStatus::Uploaded, FileStatus::Committed)
                | (FileStatus::Error, FileStatus::Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploading => "uploading",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Committed => "committed",
            FileStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "uploading" => Ok(FileStatus::Uploading),
            "uploaded" => Ok(FileStatus::Uploaded),
            "committed" => Ok(FileStatus::Committed),
            "error" => Ok(FileStatus::Error),
            _ => Err(format!("unknown file status: {s}")),
        }
    }
}

/// Metadata for a file or directory tracked by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub project_id: ProjectId,
    /// Relative path inside the project, `/`-separated.
    pub path: String,
    /// Final path component.
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// SHA-256 of the content, set once content has been captured.
    pub hash: Option<String>,
    pub status: FileStatus,
    pub is_directory: bool,
    pub parent_path: Option<String>,
    /// Where the content can be read from on the local machine.
    pub source_path: Option<PathBuf>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl FileMeta {
    /// Build a fresh `pending` record for a walked entry.
    pub fn new_pending(
        project_id: ProjectId,
        path: String,
        size: u64,
        mtime: DateTime<Utc>,
        is_directory: bool,
        source_path: Option<PathBuf>,
    ) -> Self {
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (Some(parent.to_string()), name.to_string()),
            None => (None, path.clone()),
        };
        Self {
            project_id,
            path,
            name,
            size,
            mtime,
            hash: None,
            status: FileStatus::Pending,
            is_directory,
            parent_path,
            source_path,
            uploaded_at: None,
            error_message: None,
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(self.project_id.clone(), self.path.clone())
    }
}
