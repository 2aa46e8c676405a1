//! Resource-test scoring seam
//!
//! A solution transaction (destination zero, input type
//! `SOLUTION_INPUT_TYPE`, a 32-byte nonce as input) asks the configured
//! `Scorer` to rate the nonce for its source. Every non-zero score folds
//! into the resource-testing digest every computor salts into its vote,
//! and solutions from computor keys count toward custom mining revenue.

use ledger_core::{hash, Digest, Id};
use std::fmt;

/// Input type of a solution transaction
pub const SOLUTION_INPUT_TYPE: u16 = 2;

/// Input size of a solution transaction
pub const SOLUTION_INPUT_SIZE: usize = 32;

/// Rates a resource-test solution
pub trait Scorer: Send + Sync + fmt::Debug {
    /// Score of `nonce` submitted by `public_key`; zero means invalid
    fn score(&self, public_key: &Id, nonce: &Digest) -> u32;
}

/// Scorer that rejects every solution
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScorer;

impl Scorer for NullScorer {
    fn score(&self, _public_key: &Id, _nonce: &Digest) -> u32 {
        0
    }
}

/// Resource-testing digest after accepting a solution with `score`
pub fn fold_score(digest: u64, score: u32) -> u64 {
    let mixed = digest ^ u64::from(score);
    let out = hash(&mixed.to_le_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&out[..8]);
    u64::from_le_bytes(bytes)
}

/// Key deduplicating a solution within an epoch
pub fn solution_key(public_key: &Id, nonce: &Digest) -> Digest {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(public_key.as_bytes());
    preimage[32..].copy_from_slice(nonce);
    hash(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_depends_on_score_and_history() {
        let a = fold_score(0, 5);
        assert_ne!(a, fold_score(0, 6));
        assert_ne!(fold_score(a, 5), a);
        assert_eq!(fold_score(0, 5), a);
    }

    #[test]
    fn test_null_scorer_rejects() {
        assert_eq!(NullScorer.score(&Id([1; 32]), &[2; 32]), 0);
    }
}
