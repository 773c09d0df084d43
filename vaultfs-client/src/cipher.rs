//! Content cipher
//!
//! Blobs are encrypted client-side with a fixed deployment key. The nonce
//! is derived from the content hash, so the same plaintext always yields
//! the same ciphertext; without that, two uploaders of identical content
//! would produce different blobs and the dedup path would never fire.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use sha2::{Digest, Sha256};

/// Default deployment key; override it with [`ContentCipher::new`] when
/// the deployment ships its own.
pub const DEFAULT_KEY: [u8; 32] = *b"vaultfs-default-content-key-0001";

/// SHA-256 of the plaintext as 64 lowercase hex chars.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write;
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Fixed-key symmetric cipher keyed per deployment.
#[derive(Clone)]
pub struct ContentCipher {
    key: [u8; 32],
}

impl Default for ContentCipher {
    fn default() -> Self {
        Self { key: DEFAULT_KEY }
    }
}

impl ContentCipher {
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt in place. Decryption is the same operation.
    pub fn apply(&self, hash: &str, data: &mut [u8]) {
        let nonce = nonce_from_hash(hash);
        let mut cipher = ChaCha20::new(&self.key.into(), &nonce.into());
        cipher.apply_keystream(data);
    }
}

/// First 12 bytes of the hex-decoded hash; hashes that are not hex (legal
/// on the wire, the pattern is alphanumeric) fall back to their raw ASCII
/// bytes, zero-padded.
fn nonce_from_hash(hash: &str) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let hex = hash.as_bytes();
    let decodable = hex.len() >= 24
        && hex[..24].iter().all(u8::is_ascii_hexdigit);
    if decodable {
        for (i, chunk) in hash[..24].as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).unwrap_or("00");
            nonce[i] = u8::from_str_radix(pair, 16).unwrap_or(0);
        }
    } else {
        for (slot, byte) in nonce.iter_mut().zip(hex) {
            *slot = *byte;
        }
    }
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        // Well-known digest of the empty input.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }

    #[test]
    fn test_apply_round_trips() {
        let cipher = ContentCipher::default();
        let hash = sha256_hex(b"payload");
        let mut data = b"payload".to_vec();
        cipher.apply(&hash, &mut data);
        assert_ne!(data, b"payload");
        cipher.apply(&hash, &mut data);
        assert_eq!(data, b"payload");
    }

    #[test]
    fn test_deterministic_ciphertext() {
        let cipher = ContentCipher::default();
        let hash = sha256_hex(b"same content");
        let mut a = b"same content".to_vec();
        let mut b = b"same content".to_vec();
        cipher.apply(&hash, &mut a);
        cipher.apply(&hash, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_hex_hash_still_derives_a_nonce() {
        let cipher = ContentCipher::default();
        let mut data = b"x".to_vec();
        cipher.apply("NOTHEXNOTHEXNOTHEXNOTHEX", &mut data);
        cipher.apply("NOTHEXNOTHEXNOTHEXNOTHEX", &mut data);
        assert_eq!(data, b"x");
    }
}
