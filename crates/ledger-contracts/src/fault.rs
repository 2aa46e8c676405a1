//! Contract invocation faults

use serde::{Deserialize, Serialize};

/// Why an invocation was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum ContractFault {
    /// Input and output buffers did not fit on the execution stack
    #[error("failed to allocate input and output buffers")]
    AllocInputOutputFailed,

    /// Locals did not fit on the execution stack
    #[error("failed to allocate locals")]
    AllocLocalsFailed,

    /// Nested function call context did not fit on the execution stack
    #[error("failed to allocate context for a function call to another contract")]
    AllocContextOtherFunctionCallFailed,

    /// Nested procedure call context did not fit on the execution stack
    #[error("failed to allocate context for a procedure call to another contract")]
    AllocContextOtherProcedureCallFailed,

    /// The invocation exceeded its transfer budget
    #[error("too many actions in one invocation")]
    TooManyActions,

    /// No stack or state lock became available within the invocation budget
    #[error("timed out waiting for execution resources")]
    Timeout,

    /// A lock that could deadlock was not available, so the call was stopped
    #[error("stopped to resolve a potential deadlock")]
    StoppedToResolveDeadlock,

    /// The callee does not exist, is under construction, or may not be called from here
    #[error("invalid callee")]
    InvalidCallee,

    /// The contract aborted itself
    #[error("aborted by contract with code {0}")]
    Aborted(u32),
}

impl ContractFault {
    /// Numeric code recorded in the event log
    pub fn code(&self) -> u32 {
        match self {
            Self::AllocInputOutputFailed => 1,
            Self::AllocLocalsFailed => 2,
            Self::AllocContextOtherFunctionCallFailed => 3,
            Self::AllocContextOtherProcedureCallFailed => 4,
            Self::TooManyActions => 5,
            Self::Timeout => 6,
            Self::StoppedToResolveDeadlock => 7,
            Self::InvalidCallee => 8,
            Self::Aborted(code) => 0x100 | (code & 0xff),
        }
    }
}

/// Result of contract-facing operations
pub type ContractResult<T> = std::result::Result<T, ContractFault>;
