//! Ledger log events
//!
//! Every mutating ledger operation reports what it did through an
//! `EventSink`. Sinks are shared across threads, so `record` takes `&self`.

use crate::id::Id;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Something the ledger did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Energy moved between entities. A zero source means newly credited energy.
    QuTransfer {
        /// Debited entity
        source: Id,
        /// Credited entity
        destination: Id,
        /// Amount moved
        amount: i64,
    },
    /// A new asset was issued
    AssetIssuance {
        /// Issuer key
        issuer: Id,
        /// Number of shares issued
        units: i64,
        /// Asset name, zero padded
        name: [u8; 7],
        /// Decimal places
        decimals: i8,
        /// Unit of measurement, zero padded
        unit: [u8; 7],
    },
    /// Shares changed owner
    AssetOwnershipChange {
        /// Previous owner
        source: Id,
        /// New owner
        destination: Id,
        /// Asset issuer
        issuer: Id,
        /// Shares moved
        units: i64,
        /// Asset name
        name: [u8; 7],
        /// Decimal places
        decimals: i8,
        /// Unit of measurement
        unit: [u8; 7],
    },
    /// Shares changed possessor
    AssetPossessionChange {
        /// Previous possessor
        source: Id,
        /// New possessor
        destination: Id,
        /// Asset issuer
        issuer: Id,
        /// Shares moved
        units: i64,
        /// Asset name
        name: [u8; 7],
        /// Decimal places
        decimals: i8,
        /// Unit of measurement
        unit: [u8; 7],
    },
    /// A contract burned energy into its fee reserve
    Burning {
        /// Burning contract
        source: Id,
        /// Amount burned
        amount: i64,
    },
    /// Low balances were wiped to free table slots
    DustBurning {
        /// Entities whose balances were burned, with the amount burned
        burned: Vec<(Id, i64)>,
    },
    /// Spectrum occupancy after an anti-dust pass
    SpectrumStats {
        /// Energy in circulation
        total_amount: i64,
        /// Balances at or below this were burned
        burn_all_threshold: i64,
        /// Every second balance at or below this was burned
        burn_half_threshold: i64,
        /// Occupied slots
        entities: u64,
    },
    /// A contract invocation faulted
    ContractFault {
        /// Contract index
        contract: u32,
        /// Fault code
        code: u32,
    },
}

/// A recorded event with the tick it happened in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Tick during which the event was recorded
    pub tick: u32,
    /// The event
    pub event: LedgerEvent,
}

/// Receiver of ledger events
pub trait EventSink: Send + Sync {
    /// Record one event
    fn record(&self, event: LedgerEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: LedgerEvent) {}
}

/// In-memory event journal tagged with the current tick
#[derive(Debug, Default)]
pub struct EventLog {
    tick: AtomicU32,
    entries: Mutex<Vec<LoggedEvent>>,
}

impl EventLog {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick attached to subsequent events
    pub fn set_tick(&self, tick: u32) {
        self.tick.store(tick, Ordering::Release);
    }

    /// Copy of every recorded event
    pub fn entries(&self) -> Vec<LoggedEvent> {
        self.entries.lock().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove and return every recorded event
    pub fn drain(&self) -> Vec<LoggedEvent> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl EventSink for EventLog {
    fn record(&self, event: LedgerEvent) {
        let tick = self.tick.load(Ordering::Acquire);
        tracing::trace!(tick, ?event, "Ledger event");
        self.entries.lock().push(LoggedEvent { tick, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_tags_tick() {
        let log = EventLog::new();
        log.set_tick(9);
        log.record(LedgerEvent::Burning {
            source: Id::from_contract_index(1),
            amount: 5,
        });
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tick, 9);
        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
    }
}
