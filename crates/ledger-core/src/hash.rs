//! Pure synchronous hashing for ledger digests
//!
//! Every digest the ledger commits to (table leaves, Merkle nodes, salted
//! commitments, transaction and tick-data digests) goes through this module.
//! `LedgerHash` is the seam; `ACTIVE` picks the implementation.
//!
//! ```ignore
//! use ledger_core::hash::{hash, hash_pair, hash_parts};
//!
//! let leaf = hash(b"record bytes");
//! let parent = hash_pair(&leaf, &leaf);
//! let lock = hash_parts(&[&leaf[..], &parent[..]]);
//! ```

use sha2::{Digest as _, Sha256};
use std::fmt;

/// A 32-byte digest
pub type Digest = [u8; 32];

/// The all-zero digest, used for empty ticks and absent contract state
pub const ZERO_DIGEST: Digest = [0u8; 32];

/// Hash function every node of a network must share
pub trait LedgerHash: Send + Sync + fmt::Debug {
    /// Digest of the concatenation of `parts`
    fn digest_parts(&self, parts: &[&[u8]]) -> Digest;
}

/// SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl LedgerHash for Sha256Hash {
    fn digest_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut state = Sha256::new();
        for part in parts {
            state.update(part);
        }
        state.finalize().into()
    }
}

/// Hash used by every ledger digest
pub const ACTIVE: Sha256Hash = Sha256Hash;

/// Hash bytes
#[inline]
pub fn hash(data: &[u8]) -> Digest {
    ACTIVE.digest_parts(&[data])
}

/// Hash the concatenation of `parts` without copying them together
#[inline]
pub fn hash_parts(parts: &[&[u8]]) -> Digest {
    ACTIVE.digest_parts(parts)
}

/// Hash two concatenated digests. Internal Merkle nodes are always built this way.
#[inline]
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    hash_parts(&[&left[..], &right[..]])
}

/// Salt a digest with a computor key: `hash(key ‖ digest)`.
///
/// Salted commitments are only comparable between the two parties that
/// know both the key and the underlying digest.
pub fn salted(key: &[u8; 32], digest: &Digest) -> Digest {
    hash_pair(key, digest)
}

/// Salt a 64-bit value with a computor key and truncate to 32 bits.
pub fn salted_u32(key: &[u8; 32], value: u64) -> u32 {
    let digest = hash_parts(&[&key[..], &value.to_le_bytes()[..]]);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_equal_concatenation() {
        assert_eq!(hash_parts(&[&b"tick "[..], &b"data"[..]]), hash(b"tick data"));
        assert_eq!(hash_parts(&[]), hash(b""));
        assert_ne!(hash(b"spectrum"), hash(b"spectrum!"));
    }

    #[test]
    fn test_hash_pair_is_ordered() {
        let a = hash(b"a");
        let b = hash(b"b");
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);
        assert_eq!(hash_pair(&a, &b), hash(&joined));
    }

    #[test]
    fn test_salted_depends_on_key() {
        let digest = hash(b"root");
        assert_ne!(salted(&[1u8; 32], &digest), salted(&[2u8; 32], &digest));
        assert_ne!(salted_u32(&[1u8; 32], 7), salted_u32(&[2u8; 32], 7));
        assert_eq!(salted_u32(&[1u8; 32], 7), salted_u32(&[1u8; 32], 7));
    }
}
