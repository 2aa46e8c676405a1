//! Ledger Consensus - tick agreement, transaction replay and epoch settlement
//!
//! Computors agree on one tick at a time. Each tick's leader publishes the
//! transaction digests of a future tick ahead of time, time-locked to the
//! partition roots it was built on; every node replays the agreed
//! transactions and votes with the roots it reached, salted with its own
//! key. A tick is final once a quorum of votes agrees with the local
//! replay.
//!
//! `TickProcessor` is the synchronous state machine; the node drives it
//! from its network loop.

#![forbid(unsafe_code)]

/// Consensus parameters
pub mod config;

/// End-of-epoch settlement
pub mod epoch;

/// Error types
pub mod error;

/// Reference vote of the current tick
pub mod etalon;

/// Wire messages
pub mod messages;

/// Tick state machine
pub mod processor;

/// Quorum arithmetic over votes
pub mod quorum;

/// Epoch revenue
pub mod revenue;

mod revenue_points;

/// Resource-test scoring
pub mod scorer;

/// Epoch-scoped state
pub mod system;

/// Vote, tick data and transaction storage
pub mod tick_store;

pub use config::{ConsensusConfig, RevenueModel};
pub use epoch::{EpochFinalizer, EpochReport};
pub use error::{ConsensusError, Result};
pub use etalon::Etalon;
pub use messages::{
    CurrentTickInfo, Message, RequestContractFunction, RequestEntity, RequestQuorumTick, RequestTickData,
    RequestTickTransactions, RespondContractFunction, RespondEntity, TickData, TickVote, Transaction, WireDimensions,
};
pub use processor::{
    ipo_bid_input, respond_contract_function, respond_entity, IngestOutcome, StepReport, TickPhase, TickProcessor,
};
pub use quorum::{select_target, tally, Target, VoteCounter};
pub use revenue::{compute_revenue, EpochScores, RevenueDistribution};
pub use scorer::{NullScorer, Scorer};
pub use system::{PartitionRoots, SystemState};
pub use tick_store::{StoreOutcome, TickStore};
