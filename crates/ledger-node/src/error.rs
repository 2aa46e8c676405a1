//! Node errors

use ledger_consensus::ConsensusError;
use ledger_core::LedgerError;

/// Errors raised while assembling or running a node
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The node configuration is unusable
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// The transport closed or refused a message
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// A blocking request worker failed
    #[error("Worker error: {message}")]
    Worker {
        /// Description of the failure
        message: String,
    },

    /// Consensus state could not be built or advanced
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Ledger infrastructure failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl NodeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
