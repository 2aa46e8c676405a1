//! Ledger Contracts - deterministic contract execution
//!
//! Contracts are native handlers registered in a `ContractRegistry`. The
//! `ContractRuntime` runs them on execution stacks drawn from a bounded
//! pool, under a per-contract read/write lock, and reports resource
//! exhaustion and aborts as `ContractFault`s instead of unwinding.
//!
//! Contract code reaches the ledger through `FunctionContext` (read-only)
//! and `ProcedureContext` (state-changing), which share the `Qpi` queries.

#![forbid(unsafe_code)]

/// Built-in exchange and utility contracts
pub mod builtin;

/// Fixed-offset field access for contract buffers
pub mod codec;

/// Runtime settings
pub mod config;

/// Invocation contexts
pub mod context;

/// Contract descriptors and the registry
pub mod contract;

/// Invocation faults
pub mod fault;

/// Execution stack pool
pub mod pool;

/// Contract storage and invocation
pub mod runtime;

/// Execution stack arena
pub mod stack;

pub use config::RuntimeConfig;
pub use context::{CallIdentity, Frame, FunctionContext, IncomingTransfer, ProcedureContext, Qpi, TransferKind};
pub use contract::{
    ContractDescriptor, ContractRegistry, EntryPoint, FunctionHandler, ProcedureHandler, SystemProcedure,
};
pub use fault::{ContractFault, ContractResult};
pub use pool::{StackGuard, StackPool};
pub use runtime::{ContractRuntime, ContractStorage, ExecutionClock, CONTRACTS_SNAPSHOT};
pub use stack::{RollbackRecord, StackBuffer, StackHandle};
