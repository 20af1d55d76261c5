use syncbox_core::models::chunk::FileChunk;
use syncbox_core::models::file_meta::FileKey;

use crate::hasher::xxh3_hex;

/// Number of chunks a file of `size` bytes splits into. Empty files still
/// occupy one (empty) chunk.
pub fn chunk_count(size: u64, chunk_size: u64) -> u32 {
    if size == 0 {
        return 1;
    }
    size.div_ceil(chunk_size) as u32
}

/// Split `data` into consecutive chunks of `chunk_size` bytes; only the last
/// one may be shorter.
pub fn split(key: &FileKey, data: &[u8], chunk_size: u64) -> Vec<FileChunk> {
    if data.is_empty() {
        return vec![FileChunk::new(key.clone(), 0, Vec::new(), Some(xxh3_hex(&[])))];
    }
    data.chunks(chunk_size as usize)
        .enumerate()
        .map(|(i, part)| FileChunk::new(key.clone(), i as u32, part.to_vec(), Some(xxh3_hex(part))))
        .collect()
}

/// Concatenate chunks back into the original bytes.
///
/// Chunks may arrive in any order, but indices must be exactly `0..n` and
/// every chunk must match its recorded hash, if it has one.
pub fn reassemble(chunks: &[FileChunk]) -> anyhow::Result<Vec<u8>> {
    let mut ordered: Vec<&FileChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);

    let mut out = Vec::with_capacity(ordered.iter().map(|c| c.content.len()).sum());
    for (expected, chunk) in ordered.iter().enumerate() {
        if chunk.chunk_index != expected as u32 {
            anyhow::bail!(
                "chunk sequence broken at {expected}: found index {}",
                chunk.chunk_index
            );
        }
        if chunk
            .hash
            .as_deref()
            .is_some_and(|h| h != xxh3_hex(&chunk.content))
        {
            anyhow::bail!("chunk {} does not match its hash", chunk.chunk_index);
        }
        out.extend_from_slice(&chunk.content);
    }
    Ok(out)
}

/// Whether stored chunks still describe a file of `size` bytes cut at
/// `chunk_size`, so they can be reused instead of recaptured.
pub fn layout_matches(chunks: &[FileChunk], size: u64, chunk_size: u64) -> bool {
    if chunks.len() != chunk_count(size, chunk_size) as usize {
        return false;
    }
    let total: u64 = chunks.iter().map(|c| c.size).sum();
    total == size
        && chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.chunk_index == i as u32 && (c.size == chunk_size || i + 1 == chunks.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncbox_core::models::project::ProjectId;

    fn key() -> FileKey {
        FileKey::new(ProjectId::new(), "data.bin")
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_split_sizes() {
        let data = sample(12 * 1024);
        let chunks = split(&key(), &data, 5 * 1024);
        let sizes: Vec<u64> = chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![5 * 1024, 5 * 1024, 2 * 1024]);
        assert_eq!(chunk_count(data.len() as u64, 5 * 1024), 3);
    }

    #[test]
    fn test_round_trip_across_sizes() {
        for len in [0usize, 1, 99, 100, 101, 1000] {
            for chunk_size in [1u64, 7, 100, 4096] {
                let data = sample(len);
                let chunks = split(&key(), &data, chunk_size);
                assert_eq!(chunks.len() as u32, chunk_count(len as u64, chunk_size));
                assert!(layout_matches(&chunks, len as u64, chunk_size));
                assert_eq!(reassemble(&chunks).unwrap(), data, "len={len} chunk={chunk_size}");
            }
        }
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let data = sample(30);
        let mut chunks = split(&key(), &data, 8);
        chunks.reverse();
        assert_eq!(reassemble(&chunks).unwrap(), data);
    }

    #[test]
    fn test_reassemble_rejects_gap_and_tamper() {
        let data = sample(30);
        let mut chunks = split(&key(), &data, 8);
        chunks.remove(1);
        assert!(reassemble(&chunks).is_err());

        let mut chunks = split(&key(), &data, 8);
        chunks[0].content[0] ^= 0xff;
        assert!(reassemble(&chunks).is_err());
    }

    #[test]
    fn test_layout_mismatch_on_new_chunk_size() {
        let data = sample(100);
        let chunks = split(&key(), &data, 10);
        assert!(!layout_matches(&chunks, 100, 20));
        assert!(!layout_matches(&chunks, 101, 10));
    }
}
