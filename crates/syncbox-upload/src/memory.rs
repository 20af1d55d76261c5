use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use syncbox_walk::hasher::{sha256_hex, xxh3_hex};

use crate::transport::{CancelToken, ChunkUpload, CompleteUpload, FileUpload, TransferError, Transport};

/// One request as seen by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    File { path: String, size: u64 },
    Chunk { path: String, index: u32, size: u64 },
    Complete { path: String, total_chunks: u32 },
}

#[derive(Debug, Default)]
struct PartialUpload {
    total_chunks: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct RemoteState {
    files: BTreeMap<String, Vec<u8>>,
    partial: HashMap<String, PartialUpload>,
    requests: Vec<RemoteRequest>,
    failing: HashSet<String>,
    failing_completion: HashSet<String>,
}

/// An in-process remote implementing the upload contract.
///
/// Reassembles chunked uploads, stores repeated chunks idempotently and
/// checks every hash it is given. Failures can be injected per path.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, RemoteState>, TransferError> {
        self.state
            .lock()
            .map_err(|_| TransferError::Network("remote state poisoned".into()))
    }

    fn snapshot<T>(&self, f: impl FnOnce(&RemoteState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut RemoteState)) {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Reject every request for `path` with a 500.
    pub fn fail_path(&self, path: &str) {
        self.update(|s| {
            s.failing.insert(path.to_string());
        });
    }

    /// Accept chunks for `path` but reject its completion.
    pub fn fail_completion(&self, path: &str) {
        self.update(|s| {
            s.failing_completion.insert(path.to_string());
        });
    }

    pub fn clear_failures(&self) {
        self.update(|s| {
            s.failing.clear();
            s.failing_completion.clear();
        });
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.snapshot(|s| s.files.get(path).cloned())
    }

    pub fn stored_paths(&self) -> Vec<String> {
        self.snapshot(|s| s.files.keys().cloned().collect())
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.snapshot(|s| s.requests.clone())
    }
}

fn rejected(path: &str) -> TransferError {
    TransferError::Http {
        status: 500,
        body: format!("injected failure for {path}"),
    }
}

fn unprocessable(body: String) -> TransferError {
    TransferError::Http { status: 422, body }
}

impl Transport for MemoryRemote {
    fn upload_file(&self, req: &FileUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        cancel.check()?;
        let mut state = self.state()?;
        state.requests.push(RemoteRequest::File {
            path: req.path.to_string(),
            size: req.size,
        });
        if state.failing.contains(req.path) {
            return Err(rejected(req.path));
        }
        if req.content.len() as u64 != req.size {
            return Err(unprocessable(format!(
                "{}: declared {} bytes, received {}",
                req.path,
                req.size,
                req.content.len()
            )));
        }
        if sha256_hex(req.content) != req.hash {
            return Err(unprocessable(format!("{}: hash mismatch", req.path)));
        }
        state.files.insert(req.path.to_string(), req.content.to_vec());
        Ok(())
    }

    fn upload_chunk(&self, req: &ChunkUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        cancel.check()?;
        let mut state = self.state()?;
        state.requests.push(RemoteRequest::Chunk {
            path: req.path.to_string(),
            index: req.chunk_index,
            size: req.content.len() as u64,
        });
        if state.failing.contains(req.path) {
            return Err(rejected(req.path));
        }
        if req.chunk_index >= req.total_chunks {
            return Err(unprocessable(format!(
                "{}: chunk {} of {}",
                req.path, req.chunk_index, req.total_chunks
            )));
        }
        if xxh3_hex(req.content) != req.chunk_hash {
            return Err(unprocessable(format!(
                "{}: chunk {} hash mismatch",
                req.path, req.chunk_index
            )));
        }
        let partial = state.partial.entry(req.upload_id.to_string()).or_default();
        partial.total_chunks = req.total_chunks;
        // A repeated chunk replaces the earlier copy.
        partial.chunks.insert(req.chunk_index, req.content.to_vec());
        Ok(())
    }

    fn complete_upload(&self, req: &CompleteUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        cancel.check()?;
        let mut state = self.state()?;
        state.requests.push(RemoteRequest::Complete {
            path: req.path.to_string(),
            total_chunks: req.total_chunks,
        });
        if state.failing.contains(req.path) || state.failing_completion.contains(req.path) {
            return Err(rejected(req.path));
        }

        let Some(partial) = state.partial.get(req.upload_id) else {
            return Err(TransferError::Http {
                status: 404,
                body: format!("unknown upload {}", req.upload_id),
            });
        };
        let missing: Vec<u32> = (0..req.total_chunks)
            .filter(|i| !partial.chunks.contains_key(i))
            .collect();
        if partial.total_chunks != req.total_chunks || !missing.is_empty() {
            return Err(unprocessable(format!(
                "{}: incomplete upload, missing chunks {missing:?}",
                req.path
            )));
        }

        let content: Vec<u8> = partial.chunks.values().flatten().copied().collect();
        if sha256_hex(&content) != req.hash {
            return Err(unprocessable(format!("{}: assembled hash mismatch", req.path)));
        }
        state.partial.remove(req.upload_id);
        state.files.insert(req.path.to_string(), content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk<'a>(index: u32, total: u32, content: &'a [u8], hash: &'a str, chunk_hash: &'a str) -> ChunkUpload<'a> {
        ChunkUpload {
            path: "big.bin",
            chunk_index: index,
            total_chunks: total,
            upload_id: "up-1",
            hash,
            chunk_hash,
            content,
        }
    }

    #[test]
    fn test_chunked_reassembly_tolerates_duplicates() {
        let remote = MemoryRemote::new();
        let token = CancelToken::new();
        let parts: [&[u8]; 2] = [b"hello ", b"world"];
        let full_hash = sha256_hex(b"hello world");
        let hashes: Vec<String> = parts.iter().map(|p| xxh3_hex(p)).collect();

        remote.upload_chunk(&chunk(1, 2, parts[1], &full_hash, &hashes[1]), &token).unwrap();
        remote.upload_chunk(&chunk(0, 2, parts[0], &full_hash, &hashes[0]), &token).unwrap();
        remote.upload_chunk(&chunk(0, 2, parts[0], &full_hash, &hashes[0]), &token).unwrap();
        remote
            .complete_upload(
                &CompleteUpload {
                    path: "big.bin",
                    upload_id: "up-1",
                    total_chunks: 2,
                    hash: &full_hash,
                },
                &token,
            )
            .unwrap();

        assert_eq!(remote.file("big.bin").unwrap(), b"hello world");
        assert_eq!(remote.requests().len(), 4);
    }

    #[test]
    fn test_completion_with_missing_chunk_rejected() {
        let remote = MemoryRemote::new();
        let token = CancelToken::new();
        let h = xxh3_hex(b"a");
        remote.upload_chunk(&chunk(0, 2, b"a", "x", &h), &token).unwrap();
        let err = remote
            .complete_upload(
                &CompleteUpload {
                    path: "big.bin",
                    upload_id: "up-1",
                    total_chunks: 2,
                    hash: "x",
                },
                &token,
            )
            .unwrap_err();
        assert!(matches!(err, TransferError::Http { status: 422, .. }));
        assert!(remote.file("big.bin").is_none());
    }

    #[test]
    fn test_single_file_hash_checked() {
        let remote = MemoryRemote::new();
        let token = CancelToken::new();
        let bad = FileUpload {
            path: "a.txt",
            size: 3,
            mtime: Utc::now(),
            hash: "nope",
            content: b"abc",
        };
        assert!(remote.upload_file(&bad, &token).is_err());

        let hash = sha256_hex(b"abc");
        let good = FileUpload { hash: &hash, ..bad };
        remote.upload_file(&good, &token).unwrap();
        assert_eq!(remote.stored_paths(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_injected_failure() {
        let remote = MemoryRemote::new();
        remote.fail_path("a.txt");
        let hash = sha256_hex(b"abc");
        let req = FileUpload {
            path: "a.txt",
            size: 3,
            mtime: Utc::now(),
            hash: &hash,
            content: b"abc",
        };
        let err = remote.upload_file(&req, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, TransferError::Http { status: 500, .. }));
        remote.clear_failures();
        remote.upload_file(&req, &CancelToken::new()).unwrap();
    }
}
