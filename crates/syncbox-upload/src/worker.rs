use chrono::Utc;
use std::sync::{Arc, Mutex};
use syncbox_core::config::UploadConfig;
use syncbox_core::models::batch::{Batch, BatchId, BatchStatus};
use syncbox_core::models::file_meta::FileMeta;
use syncbox_core::models::queue::{QueueStatus, SyncQueueItem};
use syncbox_db::{ops, ContentStore};

use crate::content::{self, CapturedContent};
use crate::events::{ErrorInfo, FileProgressStatus, ProgressEvent, UploadObserver};
use crate::stats::UploadStats;
use crate::transport::{CancelToken, ChunkUpload, CompleteUpload, FileUpload, TransferError, Transport};

const RECORD_MOVED: &str = "file record was removed or reset during transfer";

/// Everything a batch worker needs, shared by all workers of one run.
pub struct WorkerContext {
    pub store: ContentStore,
    pub transport: Arc<dyn Transport>,
    pub config: UploadConfig,
    pub observer: Arc<dyn UploadObserver>,
    pub stats: Arc<Mutex<UploadStats>>,
}

/// A claimed batch handed to a worker.
pub struct BatchJob {
    pub batch: Batch,
    pub files: Vec<FileMeta>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub uploaded: u32,
    pub failed: u32,
    pub cancelled: bool,
}

impl WorkerContext {
    /// Upload every file of `job` in order.
    ///
    /// A file that fails is marked `error` and the batch moves on. A store
    /// failure aborts the batch: it is marked `failed` and the error is
    /// returned to the scheduler.
    pub fn run_batch(&self, job: &BatchJob) -> anyhow::Result<BatchOutcome> {
        let batch_id = job.batch.id.clone();
        tracing::info!(batch = %batch_id, files = job.files.len(), bytes = job.batch.total_size, "batch started");

        match self.process_files(job) {
            Ok(outcome) => {
                let (status, message) = if outcome.cancelled {
                    (BatchStatus::Failed, Some("cancelled"))
                } else {
                    (BatchStatus::Completed, None)
                };
                self.store
                    .with(|conn| ops::finish_batch(conn, &batch_id, status, message))?;
                let snapshot = self.stats_snapshot();
                self.observer.on_batch_complete(
                    &batch_id,
                    outcome.uploaded + outcome.failed,
                    &snapshot,
                );
                tracing::info!(
                    batch = %batch_id,
                    uploaded = outcome.uploaded,
                    failed = outcome.failed,
                    cancelled = outcome.cancelled,
                    "batch finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!(batch = %batch_id, error = %message, "batch aborted");
                if let Err(finish_err) = self.store.with(|conn| {
                    ops::finish_batch(conn, &batch_id, BatchStatus::Failed, Some(message.as_str()))
                }) {
                    tracing::error!(batch = %batch_id, error = %finish_err, "could not mark batch failed");
                }
                self.observer.on_error(&ErrorInfo {
                    batch_id: Some(batch_id),
                    message,
                });
                Err(e)
            }
        }
    }

    fn process_files(&self, job: &BatchJob) -> anyhow::Result<BatchOutcome> {
        let batch_id = &job.batch.id;
        let mut outcome = BatchOutcome {
            batch_id: batch_id.clone(),
            uploaded: 0,
            failed: 0,
            cancelled: false,
        };
        let mut batch_bytes = 0u64;

        for meta in &job.files {
            if job.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let key = meta.key();
            let item = SyncQueueItem::for_transfer(key.clone(), batch_id.clone(), self.config.retry_attempts);
            self.store.with(|conn| ops::insert_queue_item(conn, &item))?;
            self.emit(batch_id, meta, 0, FileProgressStatus::Uploading);

            let result = self.transfer_file(batch_id, meta, &job.cancel);
            let failure = match result {
                Ok(()) => None,
                Err(e) => match e.downcast::<TransferError>() {
                    Ok(transfer) => Some(transfer),
                    // Not a transfer problem: abort the batch.
                    Err(e) => {
                        self.store.with(|conn| {
                            ops::finish_queue_item(conn, &item.id, QueueStatus::Failed, Some(e.to_string().as_str()))
                        })?;
                        return Err(e);
                    }
                },
            };

            match failure {
                None => {
                    let marked = self.store.with(|conn| {
                        if !ops::mark_file_uploaded(conn, &key, Utc::now())? {
                            ops::finish_queue_item(conn, &item.id, QueueStatus::Failed, Some(RECORD_MOVED))?;
                            return Ok(false);
                        }
                        ops::finish_queue_item(conn, &item.id, QueueStatus::Completed, None)?;
                        batch_bytes += meta.size;
                        ops::update_batch_progress(conn, batch_id, batch_bytes)?;
                        Ok(true)
                    })?;
                    if !marked {
                        tracing::warn!(path = %meta.path, "file record left `uploading` during transfer, not counted");
                        continue;
                    }
                    outcome.uploaded += 1;
                    self.update_stats(|s| s.record_uploaded(meta.size));
                    self.emit(batch_id, meta, meta.size, FileProgressStatus::Uploaded);
                }
                Some(TransferError::Cancelled) => {
                    // The file stays `uploading`; recovery surfaces it later.
                    self.store.with(|conn| {
                        ops::finish_queue_item(conn, &item.id, QueueStatus::Failed, Some("cancelled"))
                    })?;
                    outcome.cancelled = true;
                    break;
                }
                Some(err) => {
                    let message = err.to_string();
                    tracing::warn!(path = %meta.path, error = %message, "file upload failed");
                    self.store.with(|conn| {
                        ops::mark_file_error(conn, &key, &message)?;
                        ops::finish_queue_item(conn, &item.id, QueueStatus::Failed, Some(message.as_str()))
                    })?;
                    outcome.failed += 1;
                    self.update_stats(UploadStats::record_failed);
                    self.emit(batch_id, meta, 0, FileProgressStatus::Error);
                }
            }
        }
        Ok(outcome)
    }

    fn transfer_file(&self, batch_id: &BatchId, meta: &FileMeta, cancel: &CancelToken) -> anyhow::Result<()> {
        // Directory records carry no content.
        if meta.is_directory {
            return Ok(());
        }
        cancel.check()?;
        let captured = content::capture(&self.store, meta, self.config.chunk_size)?;

        if meta.size < self.config.chunk_size {
            let bytes = captured.bytes()?;
            cancel.check()?;
            self.transport.upload_file(
                &FileUpload {
                    path: &meta.path,
                    size: meta.size,
                    mtime: meta.mtime,
                    hash: &captured.hash,
                    content: &bytes,
                },
                cancel,
            )?;
            return Ok(());
        }

        self.transfer_chunked(batch_id, meta, &captured, cancel)
    }

    fn transfer_chunked(
        &self,
        batch_id: &BatchId,
        meta: &FileMeta,
        captured: &CapturedContent,
        cancel: &CancelToken,
    ) -> anyhow::Result<()> {
        let key = meta.key();
        let upload_id = content::upload_id(&key, &captured.hash);
        let total_chunks = captured.total_chunks();
        let mut sent = 0u64;

        for chunk in &captured.chunks {
            if !chunk.uploaded {
                cancel.check()?;
                let chunk_hash = chunk.hash.clone().unwrap_or_default();
                self.transport.upload_chunk(
                    &ChunkUpload {
                        path: &meta.path,
                        chunk_index: chunk.chunk_index,
                        total_chunks,
                        upload_id: &upload_id,
                        hash: &captured.hash,
                        chunk_hash: &chunk_hash,
                        content: &chunk.content,
                    },
                    cancel,
                )?;
                self.store
                    .with(|conn| ops::mark_chunk_uploaded(conn, &key, chunk.chunk_index))?;
            }
            sent += chunk.size;
            self.emit(batch_id, meta, sent, FileProgressStatus::Uploading);
        }

        cancel.check()?;
        self.transport.complete_upload(
            &CompleteUpload {
                path: &meta.path,
                upload_id: &upload_id,
                total_chunks,
                hash: &captured.hash,
            },
            cancel,
        )?;
        Ok(())
    }

    fn emit(&self, batch_id: &BatchId, meta: &FileMeta, uploaded_bytes: u64, status: FileProgressStatus) {
        let file_progress = match status {
            FileProgressStatus::Uploaded => 1.0,
            _ if meta.size == 0 => 0.0,
            _ => uploaded_bytes as f64 / meta.size as f64,
        };
        self.observer.on_progress(&ProgressEvent {
            batch_id: batch_id.clone(),
            file_path: meta.path.clone(),
            progress: run_progress(&self.stats_snapshot()),
            file_progress,
            uploaded_bytes,
            total_bytes: meta.size,
            status,
        });
    }

    fn update_stats(&self, f: impl FnOnce(&mut UploadStats)) {
        let snapshot = match self.stats.lock() {
            Ok(mut stats) => {
                f(&mut stats);
                stats.clone()
            }
            Err(_) => return,
        };
        self.observer.on_stats(&snapshot);
    }

    fn stats_snapshot(&self) -> UploadStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

fn run_progress(stats: &UploadStats) -> f64 {
    if stats.total_files == 0 {
        0.0
    } else {
        stats.uploaded_files as f64 / stats.total_files as f64
    }
}
