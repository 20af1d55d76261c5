use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ProjectId)
            .map_err(|e| format!("invalid project id {s}: {e}"))
    }
}

/// Aggregate sync state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Files are tracked locally but no upload has run.
    Local,
    /// An upload run is in progress.
    Syncing,
    /// The last run finished with every file uploaded.
    Synced,
    /// The last run left at least one file in error.
    Error,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Local => write!(f, "local"),
            ProjectStatus::Syncing => write!(f, "syncing"),
            ProjectStatus::Synced => write!(f, "synced"),
            ProjectStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ProjectStatus::Local),
            "syncing" => Ok(ProjectStatus::Syncing),
            "synced" => Ok(ProjectStatus::Synced),
            "error" => Ok(ProjectStatus::Error),
            _ => Err(format!("unknown project status: {s}")),
        }
    }
}

/// A workspace whose files are synchronized to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            name,
            created_at: now,
            last_modified: now,
            status: ProjectStatus::Local,
        }
    }
}
