//! Consensus errors
//!
//! Protocol violations from peers are never errors: malformed or badly
//! signed messages are dropped where they are ingested. This type covers
//! decoding requested by the node, snapshots and misconfiguration.

use ledger_core::LedgerError;

/// Errors raised by the consensus layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    /// A message could not be decoded
    #[error("Malformed message: {message}")]
    Malformed {
        /// What was wrong with it
        message: String,
    },

    /// The consensus state cannot take the requested step
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the conflict
        message: String,
    },

    /// Ledger infrastructure failed underneath consensus
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConsensusError {
    /// Create a malformed message error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(error: bincode::Error) -> Self {
        Self::Ledger(LedgerError::decode(error.to_string()))
    }
}

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;
