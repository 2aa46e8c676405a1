//! The locally computed reference vote
//!
//! After replaying a tick every node knows what an honest vote on it must
//! contain. Peers never reveal post-tick roots in the clear, only salted
//! with their own key, so a peer's vote is checked by salting the local
//! roots with the peer's key and comparing.

use crate::messages::TickVote;
use crate::system::PartitionRoots;
use ledger_core::hash::{salted, salted_u32};
use ledger_core::{Digest, Id, SigningIdentity, TickTimestamp, ZERO_DIGEST};

/// Expected content of every vote on the current tick
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Etalon {
    /// Current epoch
    pub epoch: u16,
    /// Tick being voted on
    pub tick: u32,
    /// Agreed time of the tick
    pub timestamp: TickTimestamp,
    /// Resource-testing digest before the tick
    pub prev_resource_testing_digest: u64,
    /// Resource-testing digest after the tick
    pub resource_testing_digest: u64,
    /// Transaction-body digest before the tick
    pub prev_transaction_body_digest: u64,
    /// Transaction-body digest after the tick
    pub transaction_body_digest: u64,
    /// Partition roots before the tick
    pub prev_roots: PartitionRoots,
    /// Partition roots after the tick
    pub roots: PartitionRoots,
    /// Content digest of the tick's data, zero if empty
    pub transaction_digest: Digest,
    /// Content digest of the next tick's data held locally, zero if none
    pub expected_next_tick_transaction_digest: Digest,
}

impl Etalon {
    /// Unsigned vote of `computor_index`, salted with `key`
    pub fn vote(&self, computor_index: u16, key: &Id) -> TickVote {
        let key = key.as_bytes();
        TickVote {
            computor_index,
            epoch: self.epoch,
            tick: self.tick,
            timestamp: self.timestamp,
            prev_resource_testing_digest: self.prev_resource_testing_digest as u32,
            salted_resource_testing_digest: salted_u32(key, self.resource_testing_digest),
            prev_transaction_body_digest: self.prev_transaction_body_digest as u32,
            salted_transaction_body_digest: salted_u32(key, self.transaction_body_digest),
            prev_spectrum_digest: self.prev_roots.spectrum,
            prev_universe_digest: self.prev_roots.universe,
            prev_computer_digest: self.prev_roots.computer,
            salted_spectrum_digest: salted(key, &self.roots.spectrum),
            salted_universe_digest: salted(key, &self.roots.universe),
            salted_computer_digest: salted(key, &self.roots.computer),
            transaction_digest: self.transaction_digest,
            expected_next_tick_transaction_digest: self.expected_next_tick_transaction_digest,
            signature: [0; 64],
        }
    }

    /// Signed vote of `computor_index`
    pub fn signed_vote(&self, computor_index: u16, identity: &SigningIdentity) -> TickVote {
        let mut vote = self.vote(computor_index, &identity.id());
        vote.sign(identity);
        vote
    }

    /// Whether `vote`, cast by the holder of `key`, agrees with this node.
    ///
    /// `expected_next_tick_transaction_digest` is advisory and not compared.
    pub fn matches(&self, vote: &TickVote, key: &Id) -> bool {
        let expected = TickVote {
            expected_next_tick_transaction_digest: vote.expected_next_tick_transaction_digest,
            signature: vote.signature,
            ..self.vote(vote.computor_index, key)
        };
        expected == *vote
    }

    /// Whether this tick executes no transactions
    pub fn is_empty_tick(&self) -> bool {
        self.transaction_digest == ZERO_DIGEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn etalon() -> Etalon {
        Etalon {
            epoch: 3,
            tick: 40,
            roots: PartitionRoots {
                spectrum: [1; 32],
                universe: [2; 32],
                computer: [3; 32],
            },
            resource_testing_digest: 99,
            ..Etalon::default()
        }
    }

    #[test]
    fn test_peer_vote_matches_under_its_own_key() {
        let etalon = etalon();
        let identity = SigningIdentity::from_seed([8; 32]);
        let vote = etalon.signed_vote(5, &identity);
        assert!(etalon.matches(&vote, &identity.id()));
        assert!(!etalon.matches(&vote, &Id([9; 32])));
        assert_ne!(vote.salted_spectrum_digest, etalon.roots.spectrum);
    }

    #[test]
    fn test_any_root_difference_misaligns() {
        let etalon = etalon();
        let key = Id([4; 32]);
        let vote = etalon.vote(1, &key);

        let mut other = etalon.clone();
        other.roots.universe = [7; 32];
        assert!(!other.matches(&vote, &key));

        let mut other = etalon.clone();
        other.resource_testing_digest += 1;
        assert!(!other.matches(&vote, &key));

        let mut other = etalon.clone();
        other.expected_next_tick_transaction_digest = [5; 32];
        assert!(other.matches(&vote, &key));
    }
}
