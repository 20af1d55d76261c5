use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use syncbox_core::error::SyncError;
use syncbox_core::models::batch::{Batch, BatchId, BatchStatus};
use syncbox_core::models::chunk::FileChunk;
use syncbox_core::models::file_meta::{FileKey, FileMeta, FileStatus};
use syncbox_core::models::project::{Project, ProjectId, ProjectStatus};
use syncbox_core::models::queue::{QueueItemType, QueueStatus, SyncQueueItem};

// ── Helpers ──

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Fixed-width so stored timestamps compare correctly as text.
fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ── Projects ──

const PROJECT_COLUMNS: &str = "id, name, status, created_at, last_modified";

pub fn insert_project(conn: &Connection, project: &Project) -> anyhow::Result<()> {
    if get_project_by_name(conn, &project.name)?.is_some() {
        return Err(SyncError::ProjectAlreadyExists {
            name: project.name.clone(),
        }
        .into());
    }
    conn.execute(
        "INSERT INTO projects (id, name, status, created_at, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project.id.to_string(),
            project.name,
            project.status.to_string(),
            fmt_dt(&project.created_at),
            fmt_dt(&project.last_modified),
        ],
    )?;
    Ok(())
}

pub fn get_project(conn: &Connection, id: &ProjectId) -> anyhow::Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id.to_string()],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

pub fn get_project_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
            params![name],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

pub fn list_projects(conn: &Connection) -> anyhow::Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name"
    ))?;
    let rows = stmt.query_map([], row_to_project)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Set the aggregate status and bump `last_modified`.
pub fn update_project_status(
    conn: &Connection,
    id: &ProjectId,
    status: ProjectStatus,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE projects SET status = ?1, last_modified = ?2 WHERE id = ?3",
        params![status.to_string(), fmt_dt(&Utc::now()), id.to_string()],
    )?;
    Ok(())
}

pub fn touch_project(conn: &Connection, id: &ProjectId) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE projects SET last_modified = ?1 WHERE id = ?2",
        params![fmt_dt(&Utc::now()), id.to_string()],
    )?;
    Ok(())
}

/// Row counts removed by a project cascade.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeSummary {
    pub files: usize,
    pub chunks: usize,
    pub queue_items: usize,
    pub batches: usize,
}

/// Delete a project and every record it owns in a single transaction.
///
/// Either all five tables lose the project's rows or none do.
pub fn delete_project(conn: &mut Connection, id: &ProjectId) -> anyhow::Result<CascadeSummary> {
    let tx = conn.transaction()?;
    let id_str = id.to_string();

    let summary = CascadeSummary {
        chunks: tx.execute("DELETE FROM chunks WHERE project_id = ?1", params![id_str])?,
        queue_items: tx.execute("DELETE FROM sync_queue WHERE project_id = ?1", params![id_str])?,
        batches: tx.execute("DELETE FROM batches WHERE project_id = ?1", params![id_str])?,
        files: tx.execute("DELETE FROM files WHERE project_id = ?1", params![id_str])?,
    };
    let removed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id_str])?;
    if removed == 0 {
        // Dropping the transaction rolls back the partial cascade.
        return Err(SyncError::ProjectNotFound { id: id_str }.into());
    }
    tx.commit()?;

    tracing::info!(
        "deleted project {}: {} files, {} chunks, {} queue items, {} batches",
        id,
        summary.files,
        summary.chunks,
        summary.queue_items,
        summary.batches
    );
    Ok(summary)
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let modified_str: String = row.get(4)?;
    Ok(Project {
        id: ProjectId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        name: row.get(1)?,
        status: status_str.parse().unwrap_or(ProjectStatus::Local),
        created_at: parse_dt(&created_str),
        last_modified: parse_dt(&modified_str),
    })
}

// ── Files ──

const FILE_COLUMNS: &str = "project_id, path, name, size, mtime, hash, status, is_directory, parent_path, source_path, uploaded_at, error_message";

/// Insert or fully overwrite a file record.
pub fn upsert_file(conn: &Connection, meta: &FileMeta) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO files (project_id, path, name, size, mtime, hash, status, is_directory, parent_path, source_path, uploaded_at, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (project_id, path) DO UPDATE SET
            name = excluded.name,
            size = excluded.size,
            mtime = excluded.mtime,
            hash = excluded.hash,
            status = excluded.status,
            is_directory = excluded.is_directory,
            parent_path = excluded.parent_path,
            source_path = excluded.source_path,
            uploaded_at = excluded.uploaded_at,
            error_message = excluded.error_message",
        params![
            meta.project_id.to_string(),
            meta.path,
            meta.name,
            meta.size as i64,
            fmt_dt(&meta.mtime),
            meta.hash,
            meta.status.as_str(),
            meta.is_directory as i32,
            meta.parent_path,
            meta.source_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            meta.uploaded_at.as_ref().map(fmt_dt),
            meta.error_message,
        ],
    )?;
    Ok(())
}

pub fn get_file(conn: &Connection, key: &FileKey) -> anyhow::Result<Option<FileMeta>> {
    let meta = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 AND path = ?2"),
            params![key.project_id.to_string(), key.path],
            row_to_file,
        )
        .optional()?;
    Ok(meta)
}

/// Files of a project in path order, optionally restricted to one status.
pub fn list_files(
    conn: &Connection,
    project_id: &ProjectId,
    status: Option<FileStatus>,
) -> anyhow::Result<Vec<FileMeta>> {
    let files = match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 AND status = ?2 ORDER BY path"
            ))?;
            let rows = stmt.query_map(params![project_id.to_string(), status.as_str()], row_to_file)?;
            rows.filter_map(|r| r.ok()).collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 ORDER BY path"
            ))?;
            let rows = stmt.query_map(params![project_id.to_string()], row_to_file)?;
            rows.filter_map(|r| r.ok()).collect()
        }
    };
    Ok(files)
}

/// Range query over a project's files with an arbitrary predicate.
pub fn query_files<F>(conn: &Connection, project_id: &ProjectId, predicate: F) -> anyhow::Result<Vec<FileMeta>>
where
    F: Fn(&FileMeta) -> bool,
{
    Ok(list_files(conn, project_id, None)?
        .into_iter()
        .filter(|f| predicate(f))
        .collect())
}

/// Number of files per status for a project.
pub fn count_files_by_status(
    conn: &Connection,
    project_id: &ProjectId,
) -> anyhow::Result<Vec<(FileStatus, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM files WHERE project_id = ?1 GROUP BY status ORDER BY status",
    )?;
    let rows = stmt.query_map(params![project_id.to_string()], |row| {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((status, count as u64))
    })?;
    Ok(rows
        .filter_map(|r| r.ok())
        .filter_map(|(s, c)| s.parse().ok().map(|s| (s, c)))
        .collect())
}

/// Move one file from `from` to `to`.
///
/// Returns `false` when the row was not in `from` (someone else moved it).
/// Edges outside the file lifecycle are rejected before touching the row.
pub fn transition_file(
    conn: &Connection,
    key: &FileKey,
    from: FileStatus,
    to: FileStatus,
) -> anyhow::Result<bool> {
    if !from.can_transition_to(to) {
        return Err(SyncError::InvalidTransition {
            path: key.path.clone(),
            from,
            to,
        }
        .into());
    }
    let changed = conn.execute(
        "UPDATE files SET status = ?1 WHERE project_id = ?2 AND path = ?3 AND status = ?4",
        params![to.as_str(), key.project_id.to_string(), key.path, from.as_str()],
    )?;
    Ok(changed == 1)
}

/// `uploading -> uploaded`, stamping the upload time.
pub fn mark_file_uploaded(conn: &Connection, key: &FileKey, at: DateTime<Utc>) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE files SET status = 'uploaded', uploaded_at = ?1, error_message = NULL
         WHERE project_id = ?2 AND path = ?3 AND status = 'uploading'",
        params![fmt_dt(&at), key.project_id.to_string(), key.path],
    )?;
    Ok(changed == 1)
}

/// `uploading -> error` with the failure message.
pub fn mark_file_error(conn: &Connection, key: &FileKey, message: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE files SET status = 'error', error_message = ?1
         WHERE project_id = ?2 AND path = ?3 AND status = 'uploading'",
        params![message, key.project_id.to_string(), key.path],
    )?;
    Ok(changed == 1)
}

pub fn set_file_hash(conn: &Connection, key: &FileKey, hash: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET hash = ?1 WHERE project_id = ?2 AND path = ?3",
        params![hash, key.project_id.to_string(), key.path],
    )?;
    Ok(())
}

/// `error -> pending` for every failed file, clearing the message.
pub fn reset_error_files(conn: &Connection, project_id: &ProjectId) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "UPDATE files SET status = 'pending', error_message = NULL
         WHERE project_id = ?1 AND status = 'error'",
        params![project_id.to_string()],
    )?;
    Ok(changed)
}

/// Surface files stranded in `uploading` by a dead run to the retry path.
pub fn mark_interrupted(conn: &Connection, project_id: &ProjectId) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "UPDATE files SET status = 'error', error_message = 'interrupted before completion'
         WHERE project_id = ?1 AND status = 'uploading'",
        params![project_id.to_string()],
    )?;
    Ok(changed)
}

/// `uploaded -> committed` for every uploaded file.
pub fn commit_uploaded(conn: &Connection, project_id: &ProjectId) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "UPDATE files SET status = 'committed' WHERE project_id = ?1 AND status = 'uploaded'",
        params![project_id.to_string()],
    )?;
    Ok(changed)
}

/// Delete one file with its chunks and queue items.
pub fn delete_file(conn: &mut Connection, key: &FileKey) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    if !remove_file_records(&tx, key)? {
        return Err(SyncError::FileNotFound {
            path: key.path.clone(),
        }
        .into());
    }
    tx.commit()?;
    Ok(())
}

/// Remove a file row with its chunks and queue items, inside the caller's
/// transaction. Returns `false` when no such file existed.
pub fn remove_file_records(conn: &Connection, key: &FileKey) -> anyhow::Result<bool> {
    let project = key.project_id.to_string();
    conn.execute(
        "DELETE FROM chunks WHERE project_id = ?1 AND path = ?2",
        params![project, key.path],
    )?;
    conn.execute(
        "DELETE FROM sync_queue WHERE project_id = ?1 AND file_path = ?2",
        params![project, key.path],
    )?;
    let removed = conn.execute(
        "DELETE FROM files WHERE project_id = ?1 AND path = ?2",
        params![project, key.path],
    )?;
    Ok(removed > 0)
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileMeta> {
    let project_str: String = row.get(0)?;
    let size: i64 = row.get(3)?;
    let mtime_str: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let is_directory: i32 = row.get(7)?;
    let source_path: Option<String> = row.get(9)?;
    let uploaded_at: Option<String> = row.get(10)?;
    Ok(FileMeta {
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        path: row.get(1)?,
        name: row.get(2)?,
        size: size as u64,
        mtime: parse_dt(&mtime_str),
        hash: row.get(5)?,
        status: status_str.parse().unwrap_or(FileStatus::Error),
        is_directory: is_directory != 0,
        parent_path: row.get(8)?,
        source_path: source_path.map(Into::into),
        uploaded_at: uploaded_at.as_deref().map(parse_dt),
        error_message: row.get(11)?,
    })
}

// ── Chunks ──

/// Replace all stored chunks of a file with `chunks`.
pub fn replace_chunks(conn: &mut Connection, key: &FileKey, chunks: &[FileChunk]) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    let project = key.project_id.to_string();
    tx.execute(
        "DELETE FROM chunks WHERE project_id = ?1 AND path = ?2",
        params![project, key.path],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO chunks (project_id, path, chunk_index, content, size, hash, uploaded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for chunk in chunks {
            stmt.execute(params![
                project,
                key.path,
                chunk.chunk_index,
                chunk.content,
                chunk.size as i64,
                chunk.hash,
                chunk.uploaded as i32,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// A file's chunks in index order.
pub fn list_chunks(conn: &Connection, key: &FileKey) -> anyhow::Result<Vec<FileChunk>> {
    let mut stmt = conn.prepare(
        "SELECT chunk_index, content, size, hash, uploaded
         FROM chunks WHERE project_id = ?1 AND path = ?2 ORDER BY chunk_index",
    )?;
    let rows = stmt.query_map(params![key.project_id.to_string(), key.path], |row| {
        let size: i64 = row.get(2)?;
        let uploaded: i32 = row.get(4)?;
        Ok(FileChunk {
            file: key.clone(),
            chunk_index: row.get(0)?,
            content: row.get(1)?,
            size: size as u64,
            hash: row.get(3)?,
            uploaded: uploaded != 0,
        })
    })?;
    let chunks: Vec<FileChunk> = rows.collect::<Result<_, _>>()?;
    Ok(chunks)
}

pub fn mark_chunk_uploaded(conn: &Connection, key: &FileKey, chunk_index: u32) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE chunks SET uploaded = 1 WHERE project_id = ?1 AND path = ?2 AND chunk_index = ?3",
        params![key.project_id.to_string(), key.path, chunk_index],
    )?;
    Ok(())
}

pub fn delete_chunks(conn: &Connection, key: &FileKey) -> anyhow::Result<usize> {
    let removed = conn.execute(
        "DELETE FROM chunks WHERE project_id = ?1 AND path = ?2",
        params![key.project_id.to_string(), key.path],
    )?;
    Ok(removed)
}

// ── Sync Queue ──

const QUEUE_COLUMNS: &str = "id, project_id, item_type, file_path, batch_id, priority, attempts, max_attempts, status, created_at, last_attempt, error_message";

pub fn insert_queue_item(conn: &Connection, item: &SyncQueueItem) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sync_queue (id, project_id, item_type, file_path, batch_id, priority, attempts, max_attempts, status, created_at, last_attempt, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            item.id.to_string(),
            item.project_id.to_string(),
            item.item_type.to_string(),
            item.file.as_ref().map(|f| f.path.clone()),
            item.batch_id.as_ref().map(|b| b.to_string()),
            item.priority,
            item.attempts,
            item.max_attempts,
            item.status.to_string(),
            fmt_dt(&item.created_at),
            item.last_attempt.as_ref().map(fmt_dt),
            item.error_message,
        ],
    )?;
    Ok(())
}

pub fn finish_queue_item(
    conn: &Connection,
    id: &Uuid,
    status: QueueStatus,
    error_message: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE sync_queue SET status = ?1, error_message = ?2 WHERE id = ?3",
        params![status.to_string(), error_message, id.to_string()],
    )?;
    Ok(())
}

pub fn list_queue_items(
    conn: &Connection,
    project_id: &ProjectId,
    status: Option<QueueStatus>,
) -> anyhow::Result<Vec<SyncQueueItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue
         WHERE project_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY priority DESC, created_at"
    ))?;
    let rows = stmt.query_map(
        params![project_id.to_string(), status.map(|s| s.to_string())],
        row_to_queue_item,
    )?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_queue_item(row: &rusqlite::Row) -> rusqlite::Result<SyncQueueItem> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let type_str: String = row.get(2)?;
    let file_path: Option<String> = row.get(3)?;
    let batch_str: Option<String> = row.get(4)?;
    let status_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let last_attempt: Option<String> = row.get(10)?;

    let project_id = ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default());
    Ok(SyncQueueItem {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        file: file_path.map(|p| FileKey::new(project_id.clone(), p)),
        project_id,
        item_type: type_str.parse().unwrap_or(QueueItemType::Content),
        batch_id: batch_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(BatchId::from_uuid),
        priority: row.get(5)?,
        attempts: row.get(6)?,
        max_attempts: row.get(7)?,
        status: status_str.parse().unwrap_or(QueueStatus::Failed),
        created_at: parse_dt(&created_str),
        last_attempt: last_attempt.as_deref().map(parse_dt),
        error_message: row.get(11)?,
    })
}

// ── Batches ──

const BATCH_COLUMNS: &str = "id, project_id, batch_hash, status, file_count, total_size, uploaded_size, created_at, completed_at, error_message";

pub fn insert_batch(conn: &Connection, batch: &Batch) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO batches (id, project_id, batch_hash, status, file_count, total_size, uploaded_size, created_at, completed_at, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            batch.id.to_string(),
            batch.project_id.to_string(),
            batch.batch_hash,
            batch.status.to_string(),
            batch.file_count,
            batch.total_size as i64,
            batch.uploaded_size as i64,
            fmt_dt(&batch.created_at),
            batch.completed_at.as_ref().map(fmt_dt),
            batch.error_message,
        ],
    )?;
    Ok(())
}

/// Claim `files` for `batch` and persist the batch, atomically.
///
/// Each file is flipped `pending -> uploading`; files that are no longer
/// pending are left out and the batch is sized from what was actually
/// claimed. Returns the claimed files in their original order. Nothing is
/// written when no file could be claimed.
pub fn claim_batch(
    conn: &mut Connection,
    batch: &mut Batch,
    files: &[FileMeta],
) -> anyhow::Result<Vec<FileMeta>> {
    let tx = conn.transaction()?;
    let mut claimed = Vec::with_capacity(files.len());
    for file in files {
        if transition_file(&tx, &file.key(), FileStatus::Pending, FileStatus::Uploading)? {
            let mut file = file.clone();
            file.status = FileStatus::Uploading;
            claimed.push(file);
        }
    }
    if claimed.is_empty() {
        return Ok(claimed);
    }
    batch.file_count = claimed.len() as u32;
    batch.total_size = claimed.iter().map(|f| f.size).sum();
    insert_batch(&tx, batch)?;
    tx.commit()?;
    Ok(claimed)
}

pub fn get_batch(conn: &Connection, id: &BatchId) -> anyhow::Result<Option<Batch>> {
    let batch = conn
        .query_row(
            &format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1"),
            params![id.to_string()],
            row_to_batch,
        )
        .optional()?;
    Ok(batch)
}

pub fn list_batches(
    conn: &Connection,
    project_id: &ProjectId,
    status: Option<BatchStatus>,
) -> anyhow::Result<Vec<Batch>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches
         WHERE project_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(
        params![project_id.to_string(), status.map(|s| s.to_string())],
        row_to_batch,
    )?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Number of batches in `status` across all projects.
pub fn count_batches_with_status(conn: &Connection, status: BatchStatus) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM batches WHERE status = ?1",
        params![status.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn update_batch_progress(conn: &Connection, id: &BatchId, uploaded_size: u64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE batches SET uploaded_size = ?1 WHERE id = ?2",
        params![uploaded_size as i64, id.to_string()],
    )?;
    Ok(())
}

/// Move a batch to a terminal status and stamp `completed_at`.
pub fn finish_batch(
    conn: &Connection,
    id: &BatchId,
    status: BatchStatus,
    error_message: Option<&str>,
) -> anyhow::Result<()> {
    let changed = conn.execute(
        "UPDATE batches SET status = ?1, completed_at = ?2, error_message = ?3 WHERE id = ?4",
        params![status.to_string(), fmt_dt(&Utc::now()), error_message, id.to_string()],
    )?;
    if changed == 0 {
        return Err(SyncError::BatchNotFound { id: id.to_string() }.into());
    }
    Ok(())
}

/// Fail batches left `uploading` by a dead run.
pub fn fail_orphaned_batches(conn: &Connection, project_id: &ProjectId) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "UPDATE batches SET status = 'failed', completed_at = ?1, error_message = 'interrupted before completion'
         WHERE project_id = ?2 AND status = 'uploading'",
        params![fmt_dt(&Utc::now()), project_id.to_string()],
    )?;
    Ok(changed)
}

/// Delete completed batches (and their finished queue items) created before
/// `older_than`. `None` sweeps every project.
pub fn cleanup_batches(
    conn: &mut Connection,
    project_id: Option<&ProjectId>,
    older_than: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    let project = project_id.map(|p| p.to_string());
    let cutoff = fmt_dt(&older_than);
    tx.execute(
        "DELETE FROM sync_queue
         WHERE status IN ('completed', 'failed')
           AND batch_id IN (
             SELECT id FROM batches
             WHERE status = 'completed' AND created_at < ?1 AND (?2 IS NULL OR project_id = ?2)
           )",
        params![cutoff, project],
    )?;
    let removed = tx.execute(
        "DELETE FROM batches
         WHERE status = 'completed' AND created_at < ?1 AND (?2 IS NULL OR project_id = ?2)",
        params![cutoff, project],
    )?;
    tx.commit()?;
    Ok(removed)
}

fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    let total_size: i64 = row.get(5)?;
    let uploaded_size: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let completed: Option<String> = row.get(8)?;
    Ok(Batch {
        id: BatchId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        batch_hash: row.get(2)?,
        status: status_str.parse().unwrap_or(BatchStatus::Failed),
        file_count: row.get(4)?,
        total_size: total_size as u64,
        uploaded_size: uploaded_size as u64,
        created_at: parse_dt(&created_str),
        completed_at: completed.as_deref().map(parse_dt),
        error_message: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    fn seed_project(conn: &Connection) -> Project {
        let project = Project::new("demo".to_string());
        insert_project(conn, &project).unwrap();
        project
    }

    fn seed_file(conn: &Connection, project: &Project, path: &str, size: u64) -> FileMeta {
        let meta = FileMeta::new_pending(
            project.id.clone(),
            path.to_string(),
            size,
            Utc::now(),
            false,
            None,
        );
        upsert_file(conn, &meta).unwrap();
        meta
    }

    #[test]
    fn test_project_crud() {
        let conn = open_memory_db().unwrap();
        let project = seed_project(&conn);

        let found = get_project_by_name(&conn, "demo").unwrap().unwrap();
        assert_eq!(found.id, project.id);
        assert_eq!(found.status, ProjectStatus::Local);

        update_project_status(&conn, &project.id, ProjectStatus::Syncing).unwrap();
        let found = get_project(&conn, &project.id).unwrap().unwrap();
        assert_eq!(found.status, ProjectStatus::Syncing);

        let dup = insert_project(&conn, &Project::new("demo".to_string()));
        assert!(dup.is_err());
        assert_eq!(list_projects(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_file_key_is_structured() {
        let conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        // Paths that would collide under a "project:path" string key.
        seed_file(&conn, &project, "a:b", 1);
        seed_file(&conn, &project, "a", 2);

        let a = get_file(&conn, &FileKey::new(project.id.clone(), "a")).unwrap().unwrap();
        assert_eq!(a.size, 2);
        assert_eq!(list_files(&conn, &project.id, None).unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let mut meta = seed_file(&conn, &project, "src/a.py", 10);
        meta.size = 20;
        upsert_file(&conn, &meta).unwrap();

        let files = list_files(&conn, &project.id, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 20);
        assert_eq!(files[0].parent_path.as_deref(), Some("src"));
    }

    #[test]
    fn test_transition_rejects_unknown_edges() {
        let conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let meta = seed_file(&conn, &project, "a.txt", 1);
        let key = meta.key();

        let err = transition_file(&conn, &key, FileStatus::Pending, FileStatus::Uploaded).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::InvalidTransition { .. })
        ));

        assert!(transition_file(&conn, &key, FileStatus::Pending, FileStatus::Uploading).unwrap());
        // Second claim finds the row already moved.
        assert!(!transition_file(&conn, &key, FileStatus::Pending, FileStatus::Uploading).unwrap());

        assert!(mark_file_uploaded(&conn, &key, Utc::now()).unwrap());
        let found = get_file(&conn, &key).unwrap().unwrap();
        assert_eq!(found.status, FileStatus::Uploaded);
        assert!(found.uploaded_at.is_some());

        assert_eq!(commit_uploaded(&conn, &project.id).unwrap(), 1);
        let found = get_file(&conn, &key).unwrap().unwrap();
        assert_eq!(found.status, FileStatus::Committed);
    }

    #[test]
    fn test_error_reset_and_interrupted() {
        let conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let a = seed_file(&conn, &project, "a", 1).key();
        let b = seed_file(&conn, &project, "b", 1).key();
        transition_file(&conn, &a, FileStatus::Pending, FileStatus::Uploading).unwrap();
        transition_file(&conn, &b, FileStatus::Pending, FileStatus::Uploading).unwrap();
        mark_file_error(&conn, &a, "boom").unwrap();

        assert_eq!(mark_interrupted(&conn, &project.id).unwrap(), 1);
        let b_meta = get_file(&conn, &b).unwrap().unwrap();
        assert_eq!(b_meta.status, FileStatus::Error);

        assert_eq!(reset_error_files(&conn, &project.id).unwrap(), 2);
        let a_meta = get_file(&conn, &a).unwrap().unwrap();
        assert_eq!(a_meta.status, FileStatus::Pending);
        assert_eq!(a_meta.error_message, None);
    }

    #[test]
    fn test_chunks_replace_and_order() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let key = seed_file(&conn, &project, "big.bin", 6).key();

        let chunks: Vec<FileChunk> = [b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec()]
            .into_iter()
            .enumerate()
            .rev()
            .map(|(i, c)| FileChunk::new(key.clone(), i as u32, c, None))
            .collect();
        replace_chunks(&mut conn, &key, &chunks).unwrap();

        let stored = list_chunks(&conn, &key).unwrap();
        let joined: Vec<u8> = stored.iter().flat_map(|c| c.content.clone()).collect();
        assert_eq!(joined, b"abcdef");

        mark_chunk_uploaded(&conn, &key, 1).unwrap();
        let stored = list_chunks(&conn, &key).unwrap();
        assert!(!stored[0].uploaded);
        assert!(stored[1].uploaded);

        replace_chunks(&mut conn, &key, &chunks[..1]).unwrap();
        assert_eq!(list_chunks(&conn, &key).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_batch_skips_non_pending() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let a = seed_file(&conn, &project, "a", 10);
        let b = seed_file(&conn, &project, "b", 20);
        transition_file(&conn, &b.key(), FileStatus::Pending, FileStatus::Uploading).unwrap();

        let files = vec![a.clone(), b.clone()];
        let mut batch = Batch::from_files(project.id.clone(), &files, "h".to_string());
        let claimed = claim_batch(&mut conn, &mut batch, &files).unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].path, "a");
        let stored = get_batch(&conn, &batch.id).unwrap().unwrap();
        assert_eq!(stored.file_count, 1);
        assert_eq!(stored.total_size, 10);
        assert_eq!(stored.status, BatchStatus::Uploading);
    }

    #[test]
    fn test_delete_project_cascades() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let other = Project::new("other".to_string());
        insert_project(&conn, &other).unwrap();

        let meta = seed_file(&conn, &project, "a", 2);
        seed_file(&conn, &other, "keep", 1);
        replace_chunks(
            &mut conn,
            &meta.key(),
            &[FileChunk::new(meta.key(), 0, b"hi".to_vec(), None)],
        )
        .unwrap();
        let batch = Batch::from_files(project.id.clone(), std::slice::from_ref(&meta), "h".into());
        insert_batch(&conn, &batch).unwrap();
        insert_queue_item(&conn, &SyncQueueItem::for_transfer(meta.key(), batch.id.clone(), 3)).unwrap();

        let summary = delete_project(&mut conn, &project.id).unwrap();
        assert_eq!(
            summary,
            CascadeSummary {
                files: 1,
                chunks: 1,
                queue_items: 1,
                batches: 1
            }
        );
        assert!(get_project(&conn, &project.id).unwrap().is_none());
        assert!(list_files(&conn, &project.id, None).unwrap().is_empty());
        assert_eq!(list_files(&conn, &other.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_project_rolls_back() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        seed_file(&conn, &project, "a", 1);

        let missing = ProjectId::new();
        let err = delete_project(&mut conn, &missing).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::ProjectNotFound { .. })
        ));
        assert_eq!(list_files(&conn, &project.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_only_old_completed_batches() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);

        let mut old = Batch::from_files(project.id.clone(), &[], "old".into());
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        old.status = BatchStatus::Completed;
        insert_batch(&conn, &old).unwrap();

        let mut fresh = Batch::from_files(project.id.clone(), &[], "fresh".into());
        fresh.status = BatchStatus::Completed;
        insert_batch(&conn, &fresh).unwrap();

        let mut failed = Batch::from_files(project.id.clone(), &[], "failed".into());
        failed.created_at = Utc::now() - chrono::Duration::hours(48);
        failed.status = BatchStatus::Failed;
        insert_batch(&conn, &failed).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        assert_eq!(cleanup_batches(&mut conn, Some(&project.id), cutoff).unwrap(), 1);
        let left: Vec<String> = list_batches(&conn, &project.id, None)
            .unwrap()
            .into_iter()
            .map(|b| b.batch_hash)
            .collect();
        assert_eq!(left, vec!["failed".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn test_delete_file_removes_chunks() {
        let mut conn = open_memory_db().unwrap();
        let project = seed_project(&conn);
        let key = seed_file(&conn, &project, "x", 1).key();
        replace_chunks(&mut conn, &key, &[FileChunk::new(key.clone(), 0, b"x".to_vec(), None)]).unwrap();

        delete_file(&mut conn, &key).unwrap();
        assert!(get_file(&conn, &key).unwrap().is_none());
        assert!(list_chunks(&conn, &key).unwrap().is_empty());
        assert!(delete_file(&mut conn, &key).is_err());
    }
}
