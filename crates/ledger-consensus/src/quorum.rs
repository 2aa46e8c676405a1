//! Quorum arithmetic over votes
//!
//! `select_target` decides which tick data the network agreed to execute
//! next; `VoteCounter` remembers which computors voted in agreement, for
//! revenue.

use ledger_core::{Digest, ZERO_DIGEST};
use serde::{Deserialize, Serialize};

/// Agreed digest of the next tick's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Not enough votes to decide yet
    Unknown,
    /// The next tick executes no transactions
    Empty,
    /// The next tick executes the tick data with this content digest
    Data(Digest),
}

impl Target {
    /// Whether a target has been decided
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Tally reported digests, in computor order.
///
/// A digest reported by at least `quorum` computors becomes the target; the
/// zero digest stands for an empty tick. When no digest can still reach
/// quorum given the computors that have not reported, the tick is empty.
pub fn tally<'a>(reported: impl IntoIterator<Item = &'a Digest>, computors: usize, quorum: usize) -> Target {
    let mut unique: Vec<(Digest, usize)> = Vec::new();
    let mut empties = 0;
    let mut total = 0;
    for digest in reported {
        total += 1;
        if *digest == ZERO_DIGEST {
            empties += 1;
        }
        match unique.iter_mut().find(|(d, _)| d == digest) {
            Some((_, count)) => *count += 1,
            None => unique.push((*digest, 1)),
        }
    }
    let Some(&(top_digest, top)) = unique
        .iter()
        .fold(None, |best: Option<&(Digest, usize)>, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
    else {
        return Target::Unknown;
    };

    if top >= quorum {
        if top_digest == ZERO_DIGEST {
            Target::Empty
        } else {
            Target::Data(top_digest)
        }
    } else if empties > computors - quorum || top + computors.saturating_sub(total) < quorum {
        Target::Empty
    } else {
        Target::Unknown
    }
}

/// Decide the target for tick `T + 1`.
///
/// Votes on `T + 1` are consulted once more than `computors - quorum`
/// computors cast them; otherwise, or when they are inconclusive, the
/// `expected_next` digests of the votes on `T` decide.
pub fn select_target<'a>(
    next_tick_digests: &[&'a Digest],
    expected_next_digests: &[&'a Digest],
    computors: usize,
    quorum: usize,
) -> Target {
    if next_tick_digests.len() > computors - quorum {
        let target = tally(next_tick_digests.iter().copied(), computors, quorum);
        if target.is_known() {
            return target;
        }
    }
    tally(expected_next_digests.iter().copied(), computors, quorum)
}

/// Per-computor count of ticks voted in agreement this epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounter {
    counts: Vec<u64>,
    last_tick: Vec<Option<u32>>,
}

impl VoteCounter {
    /// Zeroed counter for `computors` computors
    pub fn new(computors: usize) -> Self {
        Self {
            counts: vec![0; computors],
            last_tick: vec![None; computors],
        }
    }

    /// Count `computor`'s agreement on `tick`; repeats for the same tick are ignored
    pub fn register(&mut self, tick: u32, computor: usize) {
        let Some(last) = self.last_tick.get_mut(computor) else {
            return;
        };
        if last.is_some_and(|t| t >= tick) {
            return;
        }
        *last = Some(tick);
        self.counts[computor] += 1;
    }

    /// Agreements of `computor`
    pub fn count(&self, computor: usize) -> u64 {
        self.counts.get(computor).copied().unwrap_or(0)
    }

    /// Agreements of every computor in index order
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Zero every count
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.last_tick.iter_mut().for_each(|t| *t = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 676;
    const Q: usize = 451;

    fn repeated(digest: Digest, count: usize) -> Vec<Digest> {
        vec![digest; count]
    }

    #[test]
    fn test_quorum_of_one_digest_becomes_target() {
        let mut reported = repeated([7; 32], Q);
        reported.extend(repeated([8; 32], 100));
        assert_eq!(tally(&reported, N, Q), Target::Data([7; 32]));

        let reported = repeated([7; 32], Q - 1);
        assert_eq!(tally(&reported, N, Q), Target::Unknown);
    }

    #[test]
    fn test_empty_target_when_quorum_is_out_of_reach() {
        // more than N - Q report an empty tick
        let mut reported = repeated(ZERO_DIGEST, N - Q + 1);
        reported.extend(repeated([1; 32], 10));
        assert_eq!(tally(&reported, N, Q), Target::Empty);

        // split so that no digest can still collect Q votes
        let mut reported = repeated([1; 32], 300);
        reported.extend(repeated([2; 32], 300));
        assert_eq!(tally(&reported, N, Q), Target::Empty);

        assert_eq!(tally(&repeated(ZERO_DIGEST, Q), N, Q), Target::Empty);
        assert_eq!(tally(&Vec::<Digest>::new(), N, Q), Target::Unknown);
    }

    #[test]
    fn test_next_tick_votes_take_precedence() {
        let next = repeated([5; 32], Q);
        let expected = repeated([6; 32], N);
        let next_refs: Vec<&Digest> = next.iter().collect();
        let expected_refs: Vec<&Digest> = expected.iter().collect();
        assert_eq!(select_target(&next_refs, &expected_refs, N, Q), Target::Data([5; 32]));

        // too few next-tick votes to be consulted
        let few: Vec<&Digest> = next.iter().take(N - Q).collect();
        assert_eq!(select_target(&few, &expected_refs, N, Q), Target::Data([6; 32]));
    }

    #[test]
    fn test_vote_counter_counts_each_tick_once() {
        let mut counter = VoteCounter::new(3);
        counter.register(10, 1);
        counter.register(10, 1);
        counter.register(11, 1);
        counter.register(10, 2);
        counter.register(5, 9);
        assert_eq!(counter.counts(), &[0, 2, 1]);
        counter.reset();
        assert_eq!(counter.count(1), 0);
    }
}
