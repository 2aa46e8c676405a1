//! Ledger Node - the process around tick consensus
//!
//! Wires the ledger, the contract runtime and the `TickProcessor` into a
//! running node: configuration loading, the transport seam, a request
//! worker pool for read-only queries, epoch snapshots and an in-process
//! devnet for local runs.

#![forbid(unsafe_code)]

/// Time sources
pub mod clock;

/// Node configuration
pub mod config;

/// In-process development network
pub mod devnet;

/// Error types
pub mod error;

/// Node driver
pub mod node;

/// Read-only request workers
pub mod requests;

/// Message transport
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GenesisAccount, NodeConfig, NodeSection, Roster};
pub use devnet::Devnet;
pub use error::{NodeError, Result};
pub use node::{Node, NodeStatus, TracingSink};
pub use requests::RequestProcessor;
pub use transport::{Envelope, LoopbackNetwork, LoopbackTransport, PeerId, Transport};
