use serde::{Deserialize, Serialize};

use super::file_meta::FileKey;

/// A fixed-size slice of one file's captured content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunk {
    pub file: FileKey,
    /// Zero-based position; a file's chunks are contiguous.
    pub chunk_index: u32,
    pub content: Vec<u8>,
    pub size: u64,
    /// XXH3-64 of `content` (hex string).
    pub hash: Option<String>,
    /// Whether the remote acknowledged this chunk.
    pub uploaded: bool,
}

impl FileChunk {
    pub fn new(file: FileKey, chunk_index: u32, content: Vec<u8>, hash: Option<String>) -> Self {
        let size = content.len() as u64;
        Self {
            file,
            chunk_index,
            content,
            size,
            hash,
            uploaded: false,
        }
    }
}
