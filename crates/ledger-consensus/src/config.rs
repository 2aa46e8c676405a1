//! Consensus parameters (`[consensus]` in the node config)

use ledger_core::params::{NUMBER_OF_COMPUTORS, NUMBER_OF_TRANSACTIONS_PER_TICK};
use ledger_core::{quorum, Id, LedgerError, Result};
use serde::{Deserialize, Serialize};

/// How epoch revenue is split between computors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueModel {
    /// Led-tick transaction points multiplied by accepted votes
    #[default]
    TickScore,
    /// Transaction, vote and custom mining factors scaled independently
    ThreeFactor,
}

/// Settings of tick agreement and epoch settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Number of computors voting on every tick
    pub computors: usize,
    /// Transaction digest slots in one tick's data
    pub transactions_per_tick: usize,
    /// How many ticks ahead a leader publishes tick data
    pub tick_publication_offset: u32,
    /// Re-request period while the tick is stalled, in milliseconds
    pub poll_period_ms: u64,
    /// How long to wait for next-tick data before voting for an empty tick
    pub target_tick_duration_ms: u64,
    /// Revenue split used at the end of an epoch
    pub revenue_model: RevenueModel,
    /// Hex id receiving the revenue not earned by computors
    pub arbitrator: String,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            computors: NUMBER_OF_COMPUTORS,
            transactions_per_tick: NUMBER_OF_TRANSACTIONS_PER_TICK,
            tick_publication_offset: 2,
            poll_period_ms: 1000,
            target_tick_duration_ms: 3000,
            revenue_model: RevenueModel::default(),
            arbitrator: Id([0xaf; 32]).to_hex(),
        }
    }
}

impl ConsensusConfig {
    /// Agreeing computors needed to finalize a tick
    pub fn quorum(&self) -> usize {
        quorum(self.computors)
    }

    /// Parsed arbitrator id
    pub fn arbitrator_id(&self) -> Result<Id> {
        let bytes = hex::decode(&self.arbitrator)
            .map_err(|e| LedgerError::config(format!("arbitrator is not hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::config("arbitrator must be 32 bytes"))?;
        Ok(Id(bytes))
    }

    /// Check the parameters describe a workable network
    pub fn validate(&self) -> Result<()> {
        // computor indexes travel as u16
        if self.computors == 0 || self.computors > usize::from(u16::MAX) {
            return Err(LedgerError::config(format!(
                "computors must be between 1 and {}, got {}",
                u16::MAX,
                self.computors
            )));
        }
        if self.transactions_per_tick == 0 || self.transactions_per_tick > NUMBER_OF_TRANSACTIONS_PER_TICK {
            return Err(LedgerError::config(format!(
                "transactions_per_tick must be between 1 and {NUMBER_OF_TRANSACTIONS_PER_TICK}"
            )));
        }
        if self.tick_publication_offset == 0 {
            return Err(LedgerError::config("tick_publication_offset must be positive"));
        }
        if self.poll_period_ms == 0 {
            return Err(LedgerError::config("poll_period_ms must be positive"));
        }
        if self.target_tick_duration_ms == 0 {
            return Err(LedgerError::config("target_tick_duration_ms must be positive"));
        }
        if self.arbitrator_id()?.is_zero() {
            return Err(LedgerError::config("arbitrator cannot be the zero id"));
        }
        Ok(())
    }
}
