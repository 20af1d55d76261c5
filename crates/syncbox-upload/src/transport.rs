use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-batch cancellation flag shared between the scheduler and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), TransferError> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Failure moving one file. Recorded on that file only; the batch goes on.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("server returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("cancelled")]
    Cancelled,

    #[error("content unavailable: {0}")]
    ContentUnavailable(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),
}

/// Whole-file upload for files below the chunk size.
#[derive(Debug)]
pub struct FileUpload<'a> {
    pub path: &'a str,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// SHA-256 of `content`.
    pub hash: &'a str,
    pub content: &'a [u8],
}

#[derive(Debug)]
pub struct ChunkUpload<'a> {
    pub path: &'a str,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub upload_id: &'a str,
    /// SHA-256 of the whole file.
    pub hash: &'a str,
    /// XXH3 of this chunk.
    pub chunk_hash: &'a str,
    pub content: &'a [u8],
}

/// Sent once every chunk of an upload has been accepted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUpload<'a> {
    pub path: &'a str,
    pub upload_id: &'a str,
    pub total_chunks: u32,
    pub hash: &'a str,
}

/// The remote side of a sync. Implementations must tolerate the same chunk
/// being delivered more than once.
pub trait Transport: Send + Sync {
    fn upload_file(&self, req: &FileUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError>;

    fn upload_chunk(&self, req: &ChunkUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError>;

    fn complete_upload(&self, req: &CompleteUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError>;
}
