//! Epoch-scoped storage of votes, tick data and transactions
//!
//! Votes live in one flat array indexed by
//! `(tick - initial_tick) * computors + computor_index`, grown as ticks
//! advance. Tick data is kept per tick; transactions are kept per scheduled
//! tick in arrival order so a leader can pick them up in the order seen.

use crate::messages::{TickData, TickVote, Transaction};
use ledger_core::{Digest, ZERO_DIGEST};
use std::collections::{BTreeMap, HashMap};

/// Outcome of storing a vote or tick data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Slot was empty and now holds the message
    Stored,
    /// Slot already held the same content
    Duplicate,
    /// Slot holds different content from the same signer
    Conflict,
    /// Outside the storable range
    Rejected,
}

#[derive(Debug, Default)]
struct TickTransactions {
    order: Vec<Digest>,
    by_digest: HashMap<Digest, Transaction>,
}

/// Votes, tick data and transactions of the current epoch
#[derive(Debug)]
pub struct TickStore {
    computors: usize,
    initial_tick: u32,
    votes: Vec<Option<TickVote>>,
    tick_data: BTreeMap<u32, TickData>,
    transactions: BTreeMap<u32, TickTransactions>,
    transactions_per_tick_cap: usize,
}

impl TickStore {
    /// Empty store for an epoch starting at `initial_tick`.
    ///
    /// At most `transactions_per_tick_cap` unreferenced transactions are kept
    /// per tick; transactions named by stored tick data are always accepted.
    pub fn new(computors: usize, initial_tick: u32, transactions_per_tick_cap: usize) -> Self {
        Self {
            computors,
            initial_tick,
            votes: Vec::new(),
            tick_data: BTreeMap::new(),
            transactions: BTreeMap::new(),
            transactions_per_tick_cap,
        }
    }

    /// First tick of the stored epoch
    pub fn initial_tick(&self) -> u32 {
        self.initial_tick
    }

    /// Drop everything and start a new epoch at `initial_tick`
    pub fn reset(&mut self, initial_tick: u32) {
        self.initial_tick = initial_tick;
        self.votes.clear();
        self.tick_data.clear();
        self.transactions.clear();
    }

    fn vote_index(&self, tick: u32, computor: usize) -> Option<usize> {
        if computor >= self.computors || tick < self.initial_tick {
            return None;
        }
        Some((tick - self.initial_tick) as usize * self.computors + computor)
    }

    // ---------------------------------------------------------------------
    // Votes
    // ---------------------------------------------------------------------

    /// Store a vote; the caller has already checked epoch and signature
    pub fn insert_vote(&mut self, vote: TickVote) -> StoreOutcome {
        let Some(index) = self.vote_index(vote.tick, usize::from(vote.computor_index)) else {
            return StoreOutcome::Rejected;
        };
        if index >= self.votes.len() {
            self.votes.resize(index + self.computors, None);
        }
        match &self.votes[index] {
            Some(existing) if existing.same_content(&vote) => StoreOutcome::Duplicate,
            Some(_) => StoreOutcome::Conflict,
            None => {
                self.votes[index] = Some(vote);
                StoreOutcome::Stored
            }
        }
    }

    /// Vote of `computor` on `tick`
    pub fn vote(&self, tick: u32, computor: usize) -> Option<&TickVote> {
        let index = self.vote_index(tick, computor)?;
        self.votes.get(index)?.as_ref()
    }

    /// Votes on `tick` in computor order
    pub fn votes_for(&self, tick: u32) -> impl Iterator<Item = &TickVote> + '_ {
        let range = match self.vote_index(tick, 0) {
            Some(start) if start < self.votes.len() => start..(start + self.computors).min(self.votes.len()),
            _ => 0..0,
        };
        self.votes[range].iter().flatten()
    }

    /// Number of computors that voted on `tick`
    pub fn vote_count(&self, tick: u32) -> usize {
        self.votes_for(tick).count()
    }

    /// One bit per computor, set where a vote on `tick` is held
    pub fn vote_flags(&self, tick: u32) -> Vec<u8> {
        let mut flags = vec![0u8; self.computors.div_ceil(8)];
        for vote in self.votes_for(tick) {
            let computor = usize::from(vote.computor_index);
            flags[computor / 8] |= 1 << (computor % 8);
        }
        flags
    }

    // ---------------------------------------------------------------------
    // Tick data
    // ---------------------------------------------------------------------

    /// Store tick data; the caller has already checked leader and signature
    pub fn insert_tick_data(&mut self, data: TickData) -> StoreOutcome {
        if data.tick < self.initial_tick {
            return StoreOutcome::Rejected;
        }
        match self.tick_data.get(&data.tick) {
            Some(existing) if existing == &data => StoreOutcome::Duplicate,
            Some(_) => StoreOutcome::Conflict,
            None => {
                self.tick_data.insert(data.tick, data);
                StoreOutcome::Stored
            }
        }
    }

    /// Tick data held for `tick`
    pub fn tick_data(&self, tick: u32) -> Option<&TickData> {
        self.tick_data.get(&tick)
    }

    /// Forget the tick data of `tick`
    pub fn remove_tick_data(&mut self, tick: u32) -> Option<TickData> {
        self.tick_data.remove(&tick)
    }

    /// Stored tick data in tick order
    pub fn all_tick_data(&self) -> impl Iterator<Item = &TickData> + '_ {
        self.tick_data.values()
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    fn referenced(&self, tick: u32, digest: &Digest) -> bool {
        self.tick_data
            .get(&tick)
            .is_some_and(|data| data.transaction_digests.contains(digest))
    }

    /// Store a transaction under its scheduled tick
    pub fn insert_transaction(&mut self, transaction: Transaction) -> StoreOutcome {
        if transaction.tick < self.initial_tick {
            return StoreOutcome::Rejected;
        }
        let digest = transaction.digest();
        let referenced = self.referenced(transaction.tick, &digest);
        let cap = self.transactions_per_tick_cap;
        let entry = self.transactions.entry(transaction.tick).or_default();
        if entry.by_digest.contains_key(&digest) {
            return StoreOutcome::Duplicate;
        }
        if entry.order.len() >= cap && !referenced {
            return StoreOutcome::Rejected;
        }
        entry.order.push(digest);
        entry.by_digest.insert(digest, transaction);
        StoreOutcome::Stored
    }

    /// Transaction with `digest` scheduled for `tick`
    pub fn transaction(&self, tick: u32, digest: &Digest) -> Option<&Transaction> {
        self.transactions.get(&tick)?.by_digest.get(digest)
    }

    /// Transactions scheduled for `tick` in arrival order
    pub fn pending_transactions(&self, tick: u32) -> Vec<&Transaction> {
        self.transactions
            .get(&tick)
            .map(|entry| entry.order.iter().filter_map(|d| entry.by_digest.get(d)).collect())
            .unwrap_or_default()
    }

    /// Slots of the tick data for `tick` whose transaction is not held.
    ///
    /// Empty when no tick data is held.
    pub fn missing_transactions(&self, tick: u32) -> Vec<usize> {
        let Some(data) = self.tick_data.get(&tick) else {
            return Vec::new();
        };
        data.transaction_digests
            .iter()
            .enumerate()
            .filter(|(_, digest)| **digest != ZERO_DIGEST && self.transaction(tick, digest).is_none())
            .map(|(slot, _)| slot)
            .collect()
    }

    /// One bit per slot of the tick data for `tick`, set where the
    /// transaction is held or the slot is empty
    pub fn transaction_flags(&self, tick: u32, transactions_per_tick: usize) -> Vec<u8> {
        let mut flags = vec![0xffu8; transactions_per_tick.div_ceil(8)];
        for slot in self.missing_transactions(tick) {
            flags[slot / 8] &= !(1 << (slot % 8));
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::WireDimensions;
    use ledger_core::{Id, TickTimestamp};

    fn vote(tick: u32, computor: u16, digest: u8) -> TickVote {
        TickVote {
            computor_index: computor,
            epoch: 1,
            tick,
            transaction_digest: [digest; 32],
            ..TickVote::default()
        }
    }

    #[test]
    fn test_votes_index_by_tick_and_computor() {
        let mut store = TickStore::new(4, 100, 8);
        assert_eq!(store.insert_vote(vote(101, 3, 1)), StoreOutcome::Stored);
        assert_eq!(store.insert_vote(vote(100, 0, 1)), StoreOutcome::Stored);
        assert_eq!(store.insert_vote(vote(99, 0, 1)), StoreOutcome::Rejected);
        assert_eq!(store.insert_vote(vote(101, 4, 1)), StoreOutcome::Rejected);

        assert_eq!(store.vote_count(100), 1);
        assert_eq!(store.vote_count(101), 1);
        assert_eq!(store.vote_count(500), 0);
        assert_eq!(store.vote(101, 3).map(|v| v.computor_index), Some(3));
        assert_eq!(store.vote_flags(101), vec![0b1000]);
    }

    #[test]
    fn test_second_different_vote_conflicts() {
        let mut store = TickStore::new(4, 0, 8);
        store.insert_vote(vote(2, 1, 1));
        assert_eq!(store.insert_vote(vote(2, 1, 1)), StoreOutcome::Duplicate);
        assert_eq!(store.insert_vote(vote(2, 1, 2)), StoreOutcome::Conflict);
        assert_eq!(store.vote(2, 1).map(|v| v.transaction_digest), Some([1; 32]));
    }

    #[test]
    fn test_missing_transactions_follow_tick_data() {
        let dims = WireDimensions {
            computors: 4,
            transactions_per_tick: 8,
            contracts: 2,
        };
        let mut store = TickStore::new(4, 0, 1);
        let first = Transaction::new(Id([1; 32]), Id([2; 32]), 5, 7, 0, Vec::new());
        let second = Transaction::new(Id([3; 32]), Id([2; 32]), 5, 7, 0, Vec::new());

        let mut data = TickData::new(&dims, 3, 1, 7, TickTimestamp::default(), ZERO_DIGEST);
        data.transaction_digests[0] = first.digest();
        data.transaction_digests[5] = second.digest();
        store.insert_tick_data(data);
        assert_eq!(store.missing_transactions(7), vec![0, 5]);
        assert_eq!(store.transaction_flags(7, 8), vec![0b1101_1110]);

        assert_eq!(store.insert_transaction(first), StoreOutcome::Stored);
        // cap reached, but the second one is referenced by tick data
        assert_eq!(store.insert_transaction(second), StoreOutcome::Stored);
        assert!(store.missing_transactions(7).is_empty());

        let spam = Transaction::new(Id([4; 32]), Id([2; 32]), 1, 7, 0, Vec::new());
        assert_eq!(store.insert_transaction(spam), StoreOutcome::Rejected);
    }

    #[test]
    fn test_reset_clears_epoch() {
        let mut store = TickStore::new(2, 0, 4);
        store.insert_vote(vote(0, 0, 1));
        store.reset(50);
        assert_eq!(store.initial_tick(), 50);
        assert_eq!(store.vote_count(0), 0);
        assert_eq!(store.insert_vote(vote(10, 0, 1)), StoreOutcome::Rejected);
    }
}
