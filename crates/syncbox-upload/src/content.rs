//! Lazy content capture: file bytes are read only right before transfer.

use std::fs;

use syncbox_core::models::chunk::FileChunk;
use syncbox_core::models::file_meta::{FileKey, FileMeta};
use syncbox_db::{ops, ContentStore};
use syncbox_walk::chunker;
use syncbox_walk::hasher::{sha256_hex, xxh3_hex};

use crate::transport::TransferError;

/// A file's content as stored for transfer.
#[derive(Debug)]
pub struct CapturedContent {
    /// SHA-256 of the whole file.
    pub hash: String,
    pub chunks: Vec<FileChunk>,
}

impl CapturedContent {
    pub fn bytes(&self) -> Result<Vec<u8>, TransferError> {
        chunker::reassemble(&self.chunks).map_err(|e| TransferError::Integrity(e.to_string()))
    }

    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }
}

/// Return the stored chunks for `meta`, capturing them from disk first when
/// there are none or they were cut for a different size.
///
/// Source problems come back as [`TransferError::ContentUnavailable`];
/// store failures as plain errors.
pub fn capture(store: &ContentStore, meta: &FileMeta, chunk_size: u64) -> anyhow::Result<CapturedContent> {
    let key = meta.key();
    let stored = store.with(|conn| ops::list_chunks(conn, &key))?;
    if let Some(hash) = &meta.hash {
        if !stored.is_empty() && chunker::layout_matches(&stored, meta.size, chunk_size) {
            tracing::debug!(path = %meta.path, chunks = stored.len(), "reusing captured content");
            return Ok(CapturedContent {
                hash: hash.clone(),
                chunks: stored,
            });
        }
    }

    let source = meta.source_path.as_ref().ok_or_else(|| {
        TransferError::ContentUnavailable(format!("{} has no source path", meta.path))
    })?;
    let data = fs::read(source).map_err(|e| {
        TransferError::ContentUnavailable(format!("{}: {e}", source.display()))
    })?;
    if data.len() as u64 != meta.size {
        return Err(TransferError::ContentUnavailable(format!(
            "{} changed since it was added ({} bytes recorded, {} on disk)",
            meta.path,
            meta.size,
            data.len()
        ))
        .into());
    }

    let hash = sha256_hex(&data);
    let chunks = chunker::split(&key, &data, chunk_size);
    store.with(|conn| {
        ops::replace_chunks(conn, &key, &chunks)?;
        ops::set_file_hash(conn, &key, &hash)
    })?;
    tracing::debug!(path = %meta.path, chunks = chunks.len(), "captured content");
    Ok(CapturedContent { hash, chunks })
}

/// Stable id for a chunked upload of one version of a file, so a retry
/// resumes into the same remote upload.
pub fn upload_id(key: &FileKey, hash: &str) -> String {
    let seed = format!("{}\0{}\0{}", key.project_id, key.path, hash);
    format!("{}-{}", xxh3_hex(seed.as_bytes()), &hash[..hash.len().min(8)])
}
