//! Payload validation shared by services

use thiserror::Error;

/// Longest hash accepted on the wire. SHA-256 hex is 64 chars; the bound
/// leaves headroom without letting a peer feed pathological lengths into
/// path construction.
pub const MAX_HASH_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash is empty")]
    Empty,
    #[error("hash too long: {0} bytes (max: {MAX_HASH_LEN})")]
    TooLong(usize),
    #[error("non-conformant hash")]
    NonConformant,
}

/// Validate a content hash received from a peer.
///
/// Only ASCII alphanumerics pass. This is the path-traversal gate: `..`,
/// separators, NUL and every other byte that could influence path
/// resolution are rejected before a hash ever reaches the filesystem.
pub fn validate_hash(hash: &str) -> Result<(), HashError> {
    if hash.is_empty() {
        return Err(HashError::Empty);
    }
    if hash.len() > MAX_HASH_LEN {
        return Err(HashError::TooLong(hash.len()));
    }
    if !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(HashError::NonConformant);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hashes() {
        assert!(validate_hash(&"a".repeat(64)).is_ok());
        assert!(validate_hash("0123456789abcdefABCDEF").is_ok());
    }

    #[test]
    fn test_traversal_bytes_rejected() {
        for bad in ["../secret", "a/b", "a\\b", "a\0b", "..", "a-b", "a.b", "a b"] {
            assert!(validate_hash(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_empty_and_oversized_rejected() {
        assert!(matches!(validate_hash(""), Err(HashError::Empty)));
        assert!(matches!(
            validate_hash(&"a".repeat(200)),
            Err(HashError::TooLong(200))
        ));
    }
}
