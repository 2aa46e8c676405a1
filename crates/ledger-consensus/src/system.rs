//! Process-wide consensus state
//!
//! `SystemState` lives for one epoch and is reset by the epoch finalizer.
//! It is the only consensus state that is snapshotted; tick storage is
//! rebuilt from peers after a restart.

use crate::error::Result;
use crate::messages::TickData;
use crate::quorum::VoteCounter;
use ledger_contracts::ContractRuntime;
use ledger_core::persist::epoch_snapshot_name;
use ledger_core::{Digest, SnapshotStore, TickTimestamp};
use serde::{Deserialize, Serialize};

/// Snapshot name of the system state
pub const SYSTEM_SNAPSHOT: &str = "system";

/// Roots of the three state partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionRoots {
    /// Spectrum root
    pub spectrum: Digest,
    /// Universe root
    pub universe: Digest,
    /// Computer root
    pub computer: Digest,
}

impl PartitionRoots {
    /// Recompute every dirty digest and collect the roots
    pub fn recompute(runtime: &ContractRuntime) -> Self {
        Self {
            spectrum: runtime.ledger().recompute_spectrum_digest(),
            universe: runtime.ledger().recompute_universe_digest(),
            computer: runtime.recompute_digest(),
        }
    }

    /// Timelock binding tick data to these roots
    pub fn timelock(&self) -> Digest {
        TickData::timelock_for(&self.spectrum, &self.universe, &self.computer)
    }
}

/// Epoch, tick and per-computor bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Current epoch
    pub epoch: u16,
    /// Tick being agreed on
    pub tick: u32,
    /// First tick of the epoch
    pub initial_tick: u32,
    /// Timestamp of the first tick of the epoch
    pub initial_timestamp: TickTimestamp,
    /// Latest tick this node voted on
    pub latest_created_tick: Option<u32>,
    /// Latest tick this node published tick data for
    pub latest_led_tick: Option<u32>,
    /// Computors caught signing conflicting messages this epoch
    pub faulty_computors: Vec<bool>,
    /// Running digest of accepted resource-test scores
    pub resource_testing_digest: u64,
    /// Running digest of executed transactions
    pub transaction_body_digest: u64,
    /// Agreeing votes per computor this epoch
    pub vote_counter: VoteCounter,
    /// Revenue points of ticks each computor led this epoch
    pub transaction_points: Vec<u64>,
    /// Accepted resource-test solutions per computor this epoch
    pub solutions: Vec<u64>,
}

impl SystemState {
    /// State at the start of `epoch`
    pub fn new(computors: usize, epoch: u16, initial_tick: u32, initial_timestamp: TickTimestamp) -> Self {
        Self {
            epoch,
            tick: initial_tick,
            initial_tick,
            initial_timestamp,
            latest_created_tick: None,
            latest_led_tick: None,
            faulty_computors: vec![false; computors],
            resource_testing_digest: 0,
            transaction_body_digest: 0,
            vote_counter: VoteCounter::new(computors),
            transaction_points: vec![0; computors],
            solutions: vec![0; computors],
        }
    }

    /// Enter the next epoch at the current tick
    pub fn begin_epoch(&mut self, initial_timestamp: TickTimestamp) {
        self.epoch += 1;
        self.initial_tick = self.tick;
        self.initial_timestamp = initial_timestamp;
        self.faulty_computors.iter_mut().for_each(|f| *f = false);
        self.resource_testing_digest = 0;
        self.transaction_body_digest = 0;
        self.vote_counter.reset();
        self.transaction_points.iter_mut().for_each(|p| *p = 0);
        self.solutions.iter_mut().for_each(|s| *s = 0);
    }

    /// Whether `computor` has been flagged this epoch
    pub fn is_faulty(&self, computor: usize) -> bool {
        self.faulty_computors.get(computor).copied().unwrap_or(false)
    }

    /// Flag `computor`; returns whether it was newly flagged
    pub fn flag_faulty(&mut self, computor: usize) -> bool {
        match self.faulty_computors.get_mut(computor) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    /// Number of flagged computors
    pub fn faulty_count(&self) -> usize {
        self.faulty_computors.iter().filter(|f| **f).count()
    }

    /// bincode encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a bincode encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Persist under `system.<epoch>`
    pub fn save(&self, store: &dyn SnapshotStore) -> Result<()> {
        store.persist(&epoch_snapshot_name(SYSTEM_SNAPSHOT, self.epoch), &self.to_bytes()?)?;
        Ok(())
    }

    /// Load the state persisted for `epoch`
    pub fn load(store: &dyn SnapshotStore, epoch: u16) -> Result<Self> {
        let bytes = store.load(&epoch_snapshot_name(SYSTEM_SNAPSHOT, epoch))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::MemorySnapshotStore;

    #[test]
    fn test_begin_epoch_resets_epoch_scoped_state() {
        let mut system = SystemState::new(4, 7, 100, TickTimestamp::default());
        system.tick = 250;
        system.flag_faulty(2);
        system.vote_counter.register(120, 1);
        system.transaction_points[3] = 9;
        system.resource_testing_digest = 5;

        system.begin_epoch(TickTimestamp::default());
        assert_eq!(system.epoch, 8);
        assert_eq!(system.initial_tick, 250);
        assert_eq!(system.faulty_count(), 0);
        assert_eq!(system.vote_counter.count(1), 0);
        assert_eq!(system.transaction_points, vec![0; 4]);
        assert_eq!(system.resource_testing_digest, 0);
    }

    #[test]
    fn test_flagging_is_idempotent() {
        let mut system = SystemState::new(2, 1, 0, TickTimestamp::default());
        assert!(system.flag_faulty(1));
        assert!(!system.flag_faulty(1));
        assert!(!system.flag_faulty(5));
        assert!(system.is_faulty(1));
    }

    #[test]
    fn test_snapshot_restores_state() {
        let store = MemorySnapshotStore::new();
        let mut system = SystemState::new(3, 12, 40, TickTimestamp::new(24, 2, 29, 11, 0, 0, 0).unwrap());
        system.tick = 77;
        system.flag_faulty(0);
        system.save(&store).unwrap();

        assert_eq!(SystemState::load(&store, 12).unwrap(), system);
        assert!(SystemState::load(&store, 13).is_err());
    }
}
