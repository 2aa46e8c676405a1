//! Ledger Core - shared foundation of the quorum ledger
//!
//! Everything the partition, runtime and consensus crates agree on lives
//! here: entity identities, the hashing seam, the incremental Merkle digest
//! used for all three state partitions, calendar timestamps, protocol
//! constants, log events, snapshots, signatures and configuration loading.
//!
//! # Layering
//!
//! - `ledger-core`: this crate, no ledger semantics
//! - `ledger-state`: balances, assets and IPO books
//! - `ledger-contracts`: contract execution
//! - `ledger-consensus`: tick agreement and epoch settlement
//! - `ledger-node`: runtime wiring and the CLI

#![forbid(unsafe_code)]

/// Configuration loading
pub mod config;

/// Incremental Merkle digests
pub mod digest;

/// Unified error handling
pub mod errors;

/// Ledger log events and sinks
pub mod events;

/// Hashing seam
pub mod hash;

/// Entity identities
pub mod id;

/// Protocol constants
pub mod params;

/// Snapshot storage
pub mod persist;

/// Signatures
pub mod sign;

/// Tick timestamps and the epoch calendar
pub mod time;

pub use config::LedgerConfig;
pub use digest::{DigestTree, InclusionProof, LeafSource};
pub use errors::{LedgerError, Result};
pub use events::{EventLog, EventSink, LedgerEvent, LoggedEvent, NullSink};
pub use hash::{hash, hash_pair, hash_parts, Digest, ZERO_DIGEST};
pub use id::Id;
pub use params::quorum;
pub use persist::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use sign::{Ed25519Scheme, SignatureBytes, SignatureScheme, SigningIdentity, UncheckedScheme};
pub use time::TickTimestamp;
