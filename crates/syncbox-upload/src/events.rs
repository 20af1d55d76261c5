use serde::Serialize;
use syncbox_core::models::batch::BatchId;

use crate::stats::UploadStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileProgressStatus {
    Uploading,
    Uploaded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub batch_id: BatchId,
    pub file_path: String,
    /// Run progress: files uploaded so far over files in the run.
    pub progress: f64,
    /// Fraction of this file sent, `0.0..=1.0`.
    pub file_progress: f64,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub status: FileProgressStatus,
}

/// A structural failure: a batch or the scheduler itself went down.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub batch_id: Option<BatchId>,
    pub message: String,
}

/// Receives upload events. Called from worker threads; keep handlers short.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_batch_complete(&self, _batch_id: &BatchId, _files_processed: u32, _stats: &UploadStats) {}

    fn on_error(&self, _info: &ErrorInfo) {}

    fn on_stats(&self, _stats: &UploadStats) {}
}

pub struct NoopObserver;

impl UploadObserver for NoopObserver {}
