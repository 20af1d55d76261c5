/// SQL statements for creating the syncbox content store schema.

pub const CREATE_PROJECTS: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    status        TEXT NOT NULL DEFAULT 'local',
    created_at    TEXT NOT NULL,
    last_modified TEXT NOT NULL
)";

pub const CREATE_FILES: &str = "
CREATE TABLE IF NOT EXISTS files (
    project_id    TEXT NOT NULL,
    path          TEXT NOT NULL,
    name          TEXT NOT NULL,
    size          INTEGER NOT NULL DEFAULT 0,
    mtime         TEXT NOT NULL,
    hash          TEXT,
    status        TEXT NOT NULL DEFAULT 'pending',
    is_directory  INTEGER NOT NULL DEFAULT 0,
    parent_path   TEXT,
    source_path   TEXT,
    uploaded_at   TEXT,
    error_message TEXT,
    PRIMARY KEY (project_id, path),
    FOREIGN KEY (project_id) REFERENCES projects(id)
)";

pub const CREATE_FILES_STATUS_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_files_project_status ON files (project_id, status)";

pub const CREATE_CHUNKS: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    project_id    TEXT NOT NULL,
    path          TEXT NOT NULL,
    chunk_index   INTEGER NOT NULL,
    content       BLOB NOT NULL,
    size          INTEGER NOT NULL,
    hash          TEXT,
    uploaded      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, path, chunk_index),
    FOREIGN KEY (project_id, path) REFERENCES files(project_id, path)
)";

pub const CREATE_SYNC_QUEUE: &str = "
CREATE TABLE IF NOT EXISTS sync_queue (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL,
    item_type     TEXT NOT NULL,
    file_path     TEXT,
    batch_id      TEXT,
    priority      INTEGER NOT NULL DEFAULT 0,
    attempts      INTEGER NOT NULL DEFAULT 0,
    max_attempts  INTEGER NOT NULL DEFAULT 3,
    status        TEXT NOT NULL DEFAULT 'pending',
    created_at    TEXT NOT NULL,
    last_attempt  TEXT,
    error_message TEXT,
    FOREIGN KEY (project_id) REFERENCES projects(id)
)";

pub const CREATE_BATCHES: &str = "
CREATE TABLE IF NOT EXISTS batches (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL,
    batch_hash    TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    file_count    INTEGER NOT NULL,
    total_size    INTEGER NOT NULL,
    uploaded_size INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    completed_at  TEXT,
    error_message TEXT,
    FOREIGN KEY (project_id) REFERENCES projects(id)
)";

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

/// All table creation statements in order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_SCHEMA_VERSION,
    CREATE_PROJECTS,
    CREATE_FILES,
    CREATE_CHUNKS,
    CREATE_SYNC_QUEUE,
    CREATE_BATCHES,
];
