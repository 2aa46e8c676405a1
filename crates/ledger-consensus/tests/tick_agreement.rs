//! Tick agreement at production scale
//!
//! - 451 of 676 aligned votes finalize a tick, 450 do not
//! - a stalled tick keeps asking peers for what it lacks
//! - tallies only ever pick a digest reported by a quorum

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_consensus::{
    tally, ConsensusConfig, IngestOutcome, Message, NullScorer, SystemState, Target, TickPhase, TickProcessor,
};
use ledger_contracts::builtin::standard_registry;
use ledger_contracts::{ContractRuntime, RuntimeConfig};
use ledger_core::params::NUMBER_OF_COMPUTORS;
use ledger_core::{quorum, Digest, Ed25519Scheme, Id, NullSink, SigningIdentity, TickTimestamp, ZERO_DIGEST};
use ledger_state::{LedgerState, TableConfig};
use proptest::prelude::*;
use std::sync::Arc;

const EPOCH: u16 = 90;
const INITIAL_TICK: u32 = 5_000;

fn identity(index: usize) -> SigningIdentity {
    let mut seed = [0x11u8; 32];
    seed[..8].copy_from_slice(&(index as u64).to_le_bytes());
    SigningIdentity::from_seed(seed)
}

fn at(millis: u64) -> TickTimestamp {
    let mut ts = TickTimestamp::new(24, 1, 10, 6, 0, 0, 0).unwrap();
    for _ in 0..millis {
        ts.advance_millisecond();
    }
    ts
}

fn network() -> (TickProcessor, Vec<SigningIdentity>) {
    let identities: Vec<SigningIdentity> = (0..NUMBER_OF_COMPUTORS).map(identity).collect();
    let keys: Vec<Id> = identities.iter().map(SigningIdentity::id).collect();
    let ledger = Arc::new(LedgerState::new(&TableConfig::default(), Arc::new(NullSink)).unwrap());
    let runtime = Arc::new(
        ContractRuntime::new(
            RuntimeConfig::default(),
            standard_registry(8, 1).unwrap(),
            ledger,
            NUMBER_OF_COMPUTORS,
        )
        .unwrap(),
    );
    let processor = TickProcessor::new(
        ConsensusConfig::default(),
        runtime,
        keys,
        vec![(0, identity(0))],
        Arc::new(Ed25519Scheme),
        Arc::new(NullScorer),
        SystemState::new(NUMBER_OF_COMPUTORS, EPOCH, INITIAL_TICK, at(0)),
    )
    .unwrap();
    (processor, identities)
}

/// Step until this node has voted on the current tick
fn cast_own_vote(processor: &mut TickProcessor) {
    processor.step(at(0));
    let report = processor.step(at(3_000));
    assert_eq!(report.phase, TickPhase::Replaying);
    assert!(matches!(report.outbound.as_slice(), [Message::Vote(_)]));
}

fn ingest_peer_votes(processor: &mut TickProcessor, identities: &[SigningIdentity], peers: std::ops::Range<usize>) {
    for index in peers {
        let vote = processor.etalon().signed_vote(index as u16, &identities[index]);
        assert_eq!(processor.ingest_vote(vote), IngestOutcome::Accepted);
    }
}

#[test]
fn quorum_of_aligned_votes_finalizes_the_tick() {
    let (mut processor, identities) = network();
    assert_eq!(quorum(NUMBER_OF_COMPUTORS), 451);
    cast_own_vote(&mut processor);

    ingest_peer_votes(&mut processor, &identities, 1..451);
    let report = processor.step(at(3_001));
    assert_eq!(report.phase, TickPhase::Advanced);
    assert_eq!(processor.system().tick, INITIAL_TICK + 1);
    assert_eq!(processor.etalon().tick, INITIAL_TICK + 1);
    assert_eq!(processor.system().vote_counter.count(0), 1);
    assert_eq!(processor.system().vote_counter.count(451), 0);
}

#[test]
fn one_vote_short_of_quorum_stalls() {
    let (mut processor, identities) = network();
    cast_own_vote(&mut processor);

    ingest_peer_votes(&mut processor, &identities, 1..450);
    let report = processor.step(at(3_001));
    assert_eq!(report.phase, TickPhase::Replaying);
    assert_eq!(processor.system().tick, INITIAL_TICK);

    let info = processor.current_tick_info();
    assert_eq!(info.aligned_votes, 450);
    assert_eq!(info.misaligned_votes, 0);

    let requests = processor.repoll_requests();
    assert!(!requests.is_empty());
    let Message::RequestQuorumTick(request) = &requests[0] else {
        panic!("expected a quorum tick request first");
    };
    assert_eq!(request.tick, INITIAL_TICK);
    assert!(request.has_vote(0) && request.has_vote(449));
    assert!(!request.has_vote(450));

    // one more aligned vote completes the quorum
    ingest_peer_votes(&mut processor, &identities, 450..451);
    assert_eq!(processor.step(at(3_002)).phase, TickPhase::Advanced);
}

#[test]
fn misaligned_votes_do_not_count() {
    let (mut processor, identities) = network();
    cast_own_vote(&mut processor);

    let mut dissent = processor.etalon().clone();
    dissent.roots.spectrum = [0xee; 32];
    for index in 1..451 {
        let vote = dissent.signed_vote(index as u16, &identities[index]);
        processor.ingest_vote(vote);
    }
    let report = processor.step(at(3_001));
    assert_eq!(report.phase, TickPhase::Replaying);
    assert_eq!(processor.current_tick_info().misaligned_votes, 450);
}

#[test]
fn tally_prefers_earliest_of_equal_counts() {
    let a: Digest = [1; 32];
    let b: Digest = [2; 32];
    let reported = [a, b, b, a];
    assert_eq!(tally(&reported, 4, 2), Target::Data(a));
    assert_eq!(tally(&[ZERO_DIGEST; 3], 4, 3), Target::Empty);
}

fn arb_digest() -> impl Strategy<Value = Digest> {
    prop_oneof![Just(ZERO_DIGEST), Just([1u8; 32]), Just([2u8; 32]), Just([3u8; 32])]
}

proptest! {
    #[test]
    fn tally_only_picks_quorum_digests(reported in prop::collection::vec(arb_digest(), 0..30)) {
        let computors = 30;
        let quorum = quorum(computors);
        let count = |digest: &Digest| reported.iter().filter(|d| *d == digest).count();
        match tally(&reported, computors, quorum) {
            Target::Data(digest) => {
                prop_assert_ne!(digest, ZERO_DIGEST);
                prop_assert!(count(&digest) >= quorum);
            }
            Target::Unknown => {
                prop_assert!(reported.iter().all(|d| count(d) < quorum));
            }
            Target::Empty => {
                prop_assert!(reported.iter().filter(|d| **d != ZERO_DIGEST).all(|d| count(d) < quorum));
            }
        }
    }
}
