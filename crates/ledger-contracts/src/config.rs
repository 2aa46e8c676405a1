//! Runtime sizing and budgets

use ledger_core::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Settings of the contract runtime (`[runtime]` in the node config)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of execution stacks in the pool
    pub execution_stacks: usize,
    /// Size of each execution stack in bytes
    pub stack_size: usize,
    /// Stacks that only procedures may use
    pub reserved_stacks: usize,
    /// Try-lock attempts before an invocation gives up on a stack or state lock
    pub invocation_budget: u32,
    /// Transfers and other ledger actions allowed per invocation
    pub action_limit: u32,
    /// Contract that manages shares issued at IPO settlement
    pub exchange_contract: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execution_stacks: 4,
            stack_size: 1 << 20,
            reserved_stacks: 1,
            invocation_budget: 100_000,
            action_limit: 4096,
            exchange_contract: 1,
        }
    }
}

impl RuntimeConfig {
    /// Check the pool can serve both procedures and functions
    pub fn validate(&self) -> Result<()> {
        if self.execution_stacks < 2 {
            return Err(LedgerError::config("runtime needs at least 2 execution stacks"));
        }
        if self.reserved_stacks >= self.execution_stacks {
            return Err(LedgerError::config(format!(
                "reserved_stacks ({}) must leave a stack for functions",
                self.reserved_stacks
            )));
        }
        if self.stack_size < 1024 {
            return Err(LedgerError::config("stack_size must be at least 1024 bytes"));
        }
        if self.invocation_budget == 0 || self.action_limit == 0 {
            return Err(LedgerError::config("invocation budget and action limit must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unusable_pool() {
        let single = RuntimeConfig {
            execution_stacks: 1,
            ..RuntimeConfig::default()
        };
        assert!(single.validate().is_err());
        let all_reserved = RuntimeConfig {
            reserved_stacks: 4,
            ..RuntimeConfig::default()
        };
        assert!(all_reserved.validate().is_err());
    }
}
