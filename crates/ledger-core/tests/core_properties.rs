//! Property tests for digest trees and tick timestamps
//!
//! - after any sequence of flagged leaf writes, the incremental root equals
//!   a rebuild from scratch
//! - recomputing without new changes keeps the root
//! - every leaf's inclusion proof verifies against the current root
//! - advancing a timestamp keeps it valid and strictly increasing
//! - any Unix time in range maps to a valid timestamp

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_core::{hash, Digest, DigestTree, LeafSource, TickTimestamp};
use proptest::prelude::*;

const DEPTH: u32 = 5;
const LEAVES: usize = 1 << DEPTH;

struct Leaves(Vec<Vec<u8>>);

impl LeafSource for Leaves {
    fn leaf_digest(&self, index: usize) -> Digest {
        hash(&self.0[index])
    }
}

#[derive(Debug, Clone)]
enum TreeOp {
    Write(usize, Vec<u8>),
    Recompute,
    MarkAll,
}

fn tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        4 => (0..LEAVES, proptest::collection::vec(any::<u8>(), 0..16)).prop_map(|(i, b)| TreeOp::Write(i, b)),
        2 => Just(TreeOp::Recompute),
        1 => Just(TreeOp::MarkAll),
    ]
}

proptest! {
    #[test]
    fn incremental_root_matches_rebuild(ops in proptest::collection::vec(tree_op(), 1..40)) {
        let mut source = Leaves(vec![Vec::new(); LEAVES]);
        let mut tree = DigestTree::new(DEPTH).unwrap();
        tree.recompute(&source);

        for op in ops {
            match op {
                TreeOp::Write(index, bytes) => {
                    source.0[index] = bytes;
                    tree.mark_dirty(index);
                }
                TreeOp::Recompute => {
                    tree.recompute(&source);
                }
                TreeOp::MarkAll => tree.mark_all_dirty(),
            }
        }

        let root = tree.recompute(&source);
        prop_assert_eq!(tree.recompute(&source), root);

        let mut fresh = DigestTree::new(DEPTH).unwrap();
        prop_assert_eq!(fresh.rebuild(&source), root);

        for index in 0..LEAVES {
            prop_assert!(tree.proof(index).verify(&root, &hash(&source.0[index])));
        }
    }

    #[test]
    fn advancing_keeps_timestamps_valid(millis in 0u64..8_000_000_000_000, steps in 1usize..2_000) {
        let mut timestamp = TickTimestamp::from_unix_millis(millis);
        prop_assert!(timestamp.is_valid());
        for _ in 0..steps {
            let before = timestamp;
            timestamp.advance_millisecond();
            prop_assert!(timestamp.is_valid());
            prop_assert!(timestamp > before);
        }
    }
}
