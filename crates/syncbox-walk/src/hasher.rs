use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

/// SHA-256 of `data` as lowercase hex. Used as the file integrity hash on the wire.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// XXH3-64 of `data` as 16 hex chars. Used for chunk hashes and fingerprints.
pub fn xxh3_hex(data: &[u8]) -> String {
    format!("{:016x}", xxh3_64(data))
}

/// Fingerprint of an ordered list of paths.
pub fn paths_fingerprint<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut buf = Vec::new();
    for path in paths {
        buf.extend_from_slice(path.as_bytes());
        // NUL cannot appear in a path, so the encoding is unambiguous.
        buf.push(0);
    }
    xxh3_hex(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xxh3_deterministic() {
        let h1 = xxh3_hex(b"hello world");
        let h2 = xxh3_hex(b"hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16); // 64-bit = 16 hex chars
    }

    #[test]
    fn test_sha256_known() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_fingerprint_is_boundary_aware() {
        assert_ne!(
            paths_fingerprint(["ab", "c"]),
            paths_fingerprint(["a", "bc"])
        );
        assert_eq!(paths_fingerprint(["a", "b"]), paths_fingerprint(["a", "b"]));
    }
}
