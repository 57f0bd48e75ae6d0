//! Content hashing and digest validation.
//!
//! Digests double as file names inside the store, so every operation that
//! accepts one from a caller validates it here before a path is built.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_LEN: usize = 64;

/// Compute the SHA-256 digest of raw content.
///
/// The digest is taken over the UTF-8 bytes of the string as given, with no
/// normalization, and returned as 64 lowercase hex characters.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check that `hash` is exactly 64 lowercase hex characters.
#[must_use]
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validate a caller-supplied digest.
///
/// # Errors
///
/// Returns `Error::InvalidHash` for anything other than 64 lowercase hex
/// characters (uppercase, path separators and `..` included).
pub fn validate_hash(hash: &str) -> Result<()> {
    if is_valid_hash(hash) {
        Ok(())
    } else {
        Err(Error::InvalidHash {
            hash: hash.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_known_vector() {
        assert_eq!(
            hash_content("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_deterministic() {
        let first = hash_content("<html>food bank</html>");
        let second = hash_content("<html>food bank</html>");
        assert_eq!(first, second);
        assert_eq!(first.len(), HASH_LEN);
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        assert_ne!(hash_content("pantry a"), hash_content("pantry b"));
    }

    #[test]
    fn test_validate_hash_accepts_digest() {
        assert!(validate_hash(&hash_content("x")).is_ok());
    }

    #[test]
    fn test_validate_hash_rejects_malformed() {
        for bad in [
            "abc".to_string(),
            "A".repeat(64),
            "g".repeat(64),
            "a".repeat(63),
            "a".repeat(65),
            format!("../{}", "a".repeat(61)),
            String::new(),
        ] {
            assert!(
                matches!(validate_hash(&bad), Err(Error::InvalidHash { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
