//! SHA-256 hash-chain primitives for the custody event log.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Size of a SHA-256 hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte hash.
pub type Hash = [u8; HASH_SIZE];

/// Errors that can occur while working with chain hashes.
#[derive(Debug, Error)]
pub enum ChainHashError {
    /// A stored hash string is not in the `sha256:<hex>` form.
    #[error("malformed hash string: {value}")]
    Malformed {
        /// The offending string.
        value: String,
    },

    /// The event hash doesn't match the recomputed value.
    #[error("event hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The stored hash.
        expected: String,
        /// The recomputed hash.
        actual: String,
    },
}

/// Hasher for custody events.
///
/// Each event's hash is computed over the previous event's hash followed by
/// the event's canonical encoding, linking the per-item event sequence into
/// a chain. Any change to a stored event breaks verification at that event.
pub struct ChainHasher;

impl ChainHasher {
    /// The zero hash used as the previous hash for an item's first event.
    pub const GENESIS_PREV_HASH: Hash = [0u8; HASH_SIZE];

    /// Hashes event content with chain linking.
    ///
    /// The hash is computed over: `prev_hash || content`.
    #[must_use]
    pub fn hash_event(content: &[u8], prev_hash: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash);
        hasher.update(content);
        hasher.finalize().into()
    }

    /// Verifies that a stored event hash matches the recomputed value.
    ///
    /// # Errors
    ///
    /// Returns `HashMismatch` if the recomputed hash differs.
    pub fn verify_hash(
        content: &[u8],
        prev_hash: &Hash,
        expected_hash: &Hash,
    ) -> Result<(), ChainHashError> {
        let computed = Self::hash_event(content, prev_hash);
        if computed != *expected_hash {
            return Err(ChainHashError::HashMismatch {
                expected: encode(expected_hash),
                actual: encode(&computed),
            });
        }
        Ok(())
    }
}

/// Renders a hash in the `sha256:<hex>` display form.
#[must_use]
pub fn encode(hash: &Hash) -> String {
    format!("sha256:{}", hex::encode(hash))
}

/// Parses the `sha256:<hex>` display form back into a hash.
///
/// # Errors
///
/// Returns `Malformed` when the prefix or hex payload is wrong.
pub fn decode(value: &str) -> Result<Hash, ChainHashError> {
    let malformed = || ChainHashError::Malformed {
        value: value.to_string(),
    };
    let hex_part = value.strip_prefix("sha256:").ok_or_else(malformed)?;
    let bytes = hex::decode(hex_part).map_err(|_| malformed())?;
    bytes.try_into().map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = ChainHasher::hash_event(b"payload", &ChainHasher::GENESIS_PREV_HASH);
        let b = ChainHasher::hash_event(b"payload", &ChainHasher::GENESIS_PREV_HASH);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_depends_on_prev_hash() {
        let first = ChainHasher::hash_event(b"payload", &ChainHasher::GENESIS_PREV_HASH);
        let chained = ChainHasher::hash_event(b"payload", &first);
        assert_ne!(first, chained);
    }

    #[test]
    fn verify_rejects_tampered_content() {
        let hash = ChainHasher::hash_event(b"original", &ChainHasher::GENESIS_PREV_HASH);
        assert!(
            ChainHasher::verify_hash(b"original", &ChainHasher::GENESIS_PREV_HASH, &hash).is_ok()
        );
        let err = ChainHasher::verify_hash(b"tampered", &ChainHasher::GENESIS_PREV_HASH, &hash)
            .unwrap_err();
        assert!(matches!(err, ChainHashError::HashMismatch { .. }));
    }

    #[test]
    fn encode_decode_round_trip() {
        let hash = ChainHasher::hash_event(b"x", &ChainHasher::GENESIS_PREV_HASH);
        let rendered = encode(&hash);
        assert!(rendered.starts_with("sha256:"));
        assert_eq!(decode(&rendered).expect("decode"), hash);
    }

    #[test]
    fn decode_rejects_malformed_strings() {
        assert!(decode("md5:abcd").is_err());
        assert!(decode("sha256:zz").is_err());
        assert!(decode("sha256:abcd").is_err());
    }
}
