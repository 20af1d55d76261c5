use syncbox_core::error::SyncError;
use syncbox_core::models::file_meta::{FileMeta, FileStatus};
use syncbox_core::models::project::ProjectId;
use syncbox_core::models::queue::{QueueItemType, QueueStatus, SyncQueueItem};
use syncbox_db::{ops, ContentStore};

use crate::walker::{WalkResult, WalkedFile};

/// What ingesting one walk did to the project's file records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub added: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// Changed on disk while a transfer holds the record; picked up next walk.
    pub in_flight: usize,
}

/// Persist walked entries as `pending` file records under `project_id`.
///
/// New paths are inserted. A path whose size or mtime moved is a new version:
/// the old record goes away with its chunks and queue items and a fresh
/// `pending` record takes its place, so no record ever moves backwards along
/// its status edges. Unchanged paths keep their status. Everything happens in one transaction together with a completed
/// `meta` queue item.
pub fn ingest(
    store: &ContentStore,
    project_id: &ProjectId,
    walked: &WalkResult,
) -> anyhow::Result<IngestSummary> {
    store.with(|conn| {
        if ops::get_project(conn, project_id)?.is_none() {
            return Err(SyncError::ProjectNotFound {
                id: project_id.to_string(),
            }
            .into());
        }

        let tx = conn.transaction()?;
        let mut summary = IngestSummary::default();

        for file in &walked.files {
            let fresh = to_meta(project_id, file);
            match ops::get_file(&tx, &fresh.key())? {
                None => {
                    ops::upsert_file(&tx, &fresh)?;
                    summary.added += 1;
                }
                Some(existing) if same_version(&existing, &fresh) => {
                    if existing.source_path != fresh.source_path {
                        ops::upsert_file(
                            &tx,
                            &FileMeta {
                                source_path: fresh.source_path,
                                ..existing
                            },
                        )?;
                    }
                    summary.unchanged += 1;
                }
                Some(existing) if existing.status == FileStatus::Uploading => {
                    tracing::warn!(path = %existing.path, "changed during transfer, left as is");
                    summary.in_flight += 1;
                }
                Some(existing) => {
                    tracing::debug!(path = %existing.path, from = %existing.status, "new version replaces record");
                    ops::remove_file_records(&tx, &existing.key())?;
                    ops::upsert_file(&tx, &fresh)?;
                    summary.changed += 1;
                }
            }
        }

        let mut item = SyncQueueItem::new(project_id.clone(), QueueItemType::Meta, 1);
        item.attempts = 1;
        item.last_attempt = Some(item.created_at);
        item.status = QueueStatus::Completed;
        ops::insert_queue_item(&tx, &item)?;
        ops::touch_project(&tx, project_id)?;
        tx.commit()?;

        tracing::info!(
            project = %project_id,
            added = summary.added,
            changed = summary.changed,
            unchanged = summary.unchanged,
            "ingested walk"
        );
        Ok(summary)
    })
}

fn to_meta(project_id: &ProjectId, file: &WalkedFile) -> FileMeta {
    FileMeta::new_pending(
        project_id.clone(),
        file.path.clone(),
        file.size,
        file.mtime,
        file.is_directory,
        Some(file.source_path.clone()),
    )
}

// Stored timestamps keep microseconds.
fn same_version(existing: &FileMeta, fresh: &FileMeta) -> bool {
    existing.size == fresh.size
        && existing.is_directory == fresh.is_directory
        && existing.mtime.timestamp_micros() == fresh.mtime.timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::{walk, Selection};
    use chrono::{Duration, Utc};
    use std::fs;
    use std::path::PathBuf;
    use syncbox_core::config::WalkConfig;
    use syncbox_core::models::chunk::FileChunk;
    use syncbox_core::models::file_meta::FileKey;
    use syncbox_core::models::project::Project;

    fn setup() -> (ContentStore, Project) {
        let store = ContentStore::open_in_memory().unwrap();
        let project = Project::new("demo".to_string());
        store.with(|conn| ops::insert_project(conn, &project)).unwrap();
        (store, project)
    }

    fn walked(path: &str, size: u64) -> WalkedFile {
        WalkedFile {
            path: path.to_string(),
            size,
            mtime: Utc::now(),
            is_directory: false,
            source_path: PathBuf::from("/src").join(path),
        }
    }

    fn result_of(files: Vec<WalkedFile>) -> WalkResult {
        WalkResult {
            file_count: files.len() as u64,
            total_size: files.iter().map(|f| f.size).sum(),
            files,
            ..WalkResult::default()
        }
    }

    #[test]
    fn test_dropped_folder_yields_two_pending_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("proj");
        for (rel, body) in [
            ("src/a.py", "0123456789"),
            ("src/b.py", "9876543210"),
            ("vendor/lib/index.js", "x=1;\n"),
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        let result = walk(
            &Selection::Entries(vec![root]),
            &WalkConfig::default(),
            &mut |_| {},
        )
        .unwrap();

        let (store, project) = setup();
        let summary = ingest(&store, &project.id, &result).unwrap();
        assert_eq!(summary.added, 2);

        let files = store
            .with(|conn| ops::list_files(conn, &project.id, None))
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.status == FileStatus::Pending));
        assert!(files.iter().all(|f| f.size == 10));
        assert_eq!(files[0].parent_path.as_deref(), Some("proj/src"));
    }

    #[test]
    fn test_reingest_replaces_changed_keeps_unchanged() {
        let (store, project) = setup();
        let a = walked("a.txt", 4);
        let b = walked("b.txt", 4);
        ingest(&store, &project.id, &result_of(vec![a.clone(), b.clone()])).unwrap();

        // Pretend both uploaded, and give b a captured chunk.
        store
            .with(|conn| {
                for path in ["a.txt", "b.txt"] {
                    let key = FileKey::new(project.id.clone(), path);
                    ops::transition_file(conn, &key, FileStatus::Pending, FileStatus::Uploading)?;
                    ops::mark_file_uploaded(conn, &key, Utc::now())?;
                }
                let key = FileKey::new(project.id.clone(), "b.txt");
                ops::replace_chunks(conn, &key, &[FileChunk::new(key.clone(), 0, b"bbbb".to_vec(), None)])
            })
            .unwrap();

        let later = b.mtime + Duration::seconds(3);
        let b2 = WalkedFile {
            size: 5,
            mtime: later,
            ..b
        };
        let summary = ingest(&store, &project.id, &result_of(vec![a, b2])).unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.changed, 1);

        store
            .with(|conn| {
                let a = ops::get_file(conn, &FileKey::new(project.id.clone(), "a.txt"))?.unwrap();
                let b = ops::get_file(conn, &FileKey::new(project.id.clone(), "b.txt"))?.unwrap();
                assert_eq!(a.status, FileStatus::Uploaded);
                assert_eq!(b.status, FileStatus::Pending);
                assert_eq!(b.size, 5);
                assert_eq!(b.uploaded_at, None);
                assert!(ops::list_chunks(conn, &b.key())?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_changed_failed_file_drops_old_transfer_history() {
        let (store, project) = setup();
        let a = walked("a.txt", 4);
        ingest(&store, &project.id, &result_of(vec![a.clone()])).unwrap();
        let key = FileKey::new(project.id.clone(), "a.txt");

        store
            .with(|conn| {
                ops::transition_file(conn, &key, FileStatus::Pending, FileStatus::Uploading)?;
                ops::mark_file_error(conn, &key, "connection reset")?;
                let mut item = SyncQueueItem::new(project.id.clone(), QueueItemType::Content, 3);
                item.file = Some(key.clone());
                item.status = QueueStatus::Failed;
                ops::insert_queue_item(conn, &item)?;
                ops::replace_chunks(conn, &key, &[FileChunk::new(key.clone(), 0, b"aaaa".to_vec(), None)])
            })
            .unwrap();

        let a2 = WalkedFile {
            size: 7,
            mtime: a.mtime + Duration::seconds(5),
            ..a
        };
        let summary = ingest(&store, &project.id, &result_of(vec![a2])).unwrap();
        assert_eq!(summary.changed, 1);

        store
            .with(|conn| {
                let a = ops::get_file(conn, &key)?.unwrap();
                assert_eq!(a.status, FileStatus::Pending);
                assert_eq!(a.size, 7);
                assert_eq!(a.error_message, None);
                assert!(ops::list_chunks(conn, &key)?.is_empty());
                let items = ops::list_queue_items(conn, &project.id, None)?;
                assert!(items.iter().all(|i| i.item_type == QueueItemType::Meta));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_in_flight_file_left_alone() {
        let (store, project) = setup();
        let a = walked("a.txt", 4);
        ingest(&store, &project.id, &result_of(vec![a.clone()])).unwrap();
        let key = FileKey::new(project.id.clone(), "a.txt");
        store
            .with(|conn| ops::transition_file(conn, &key, FileStatus::Pending, FileStatus::Uploading))
            .unwrap();

        let summary = ingest(&store, &project.id, &result_of(vec![walked("a.txt", 9)])).unwrap();
        assert_eq!(summary.in_flight, 1);
        let a = store.with(|conn| ops::get_file(conn, &key)).unwrap().unwrap();
        assert_eq!(a.status, FileStatus::Uploading);
        assert_eq!(a.size, 4);
    }

    #[test]
    fn test_records_meta_queue_item() {
        let (store, project) = setup();
        ingest(&store, &project.id, &result_of(vec![walked("a.txt", 1)])).unwrap();
        let items = store
            .with(|conn| ops::list_queue_items(conn, &project.id, Some(QueueStatus::Completed)))
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, QueueItemType::Meta);
    }

    #[test]
    fn test_unknown_project() {
        let store = ContentStore::open_in_memory().unwrap();
        let err = ingest(&store, &ProjectId::new(), &result_of(vec![walked("a.txt", 1)])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::ProjectNotFound { .. })
        ));
    }
}
