//! Spectrum and universe snapshots
//!
//! Both tables are stored as their concatenated canonical records under
//! epoch-suffixed names (`spectrum.083`, `universe.083`). Loading rebuilds
//! occupancy, index lists and every digest from the records.

use crate::assets::Universe;
use crate::config::TableConfig;
use crate::ledger::LedgerState;
use crate::spectrum::Spectrum;
use ledger_core::persist::epoch_snapshot_name;
use ledger_core::{EventSink, Result, SnapshotStore};
use std::sync::Arc;

/// Base name of spectrum snapshots
pub const SPECTRUM_SNAPSHOT: &str = "spectrum";

/// Base name of universe snapshots
pub const UNIVERSE_SNAPSHOT: &str = "universe";

/// Persist both tables of `ledger` for `epoch`
pub fn save_tables(ledger: &LedgerState, store: &dyn SnapshotStore, epoch: u16) -> Result<()> {
    let spectrum = ledger.with_spectrum(Spectrum::to_bytes);
    store.persist(&epoch_snapshot_name(SPECTRUM_SNAPSHOT, epoch), &spectrum)?;
    let universe = ledger.with_universe(Universe::to_bytes);
    store.persist(&epoch_snapshot_name(UNIVERSE_SNAPSHOT, epoch), &universe)?;
    tracing::info!(epoch, "Ledger tables saved");
    Ok(())
}

/// Restore both tables saved for `epoch`
pub fn load_tables(
    config: &TableConfig,
    store: &dyn SnapshotStore,
    epoch: u16,
    events: Arc<dyn EventSink>,
) -> Result<LedgerState> {
    let spectrum = Spectrum::from_bytes(
        config.spectrum_depth,
        &store.load(&epoch_snapshot_name(SPECTRUM_SNAPSHOT, epoch))?,
    )?;
    let universe = Universe::from_bytes(
        config.asset_depth,
        &store.load(&epoch_snapshot_name(UNIVERSE_SNAPSHOT, epoch))?,
    )?;
    tracing::info!(epoch, entities = spectrum.info().number_of_entities, "Ledger tables loaded");
    Ok(LedgerState::from_tables(spectrum, universe, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetName;
    use ledger_core::{FileSnapshotStore, Id, MemorySnapshotStore, NullSink};

    fn populated() -> (TableConfig, LedgerState) {
        let config = TableConfig {
            spectrum_depth: 5,
            asset_depth: 5,
        };
        let ledger = LedgerState::new(&config, Arc::new(NullSink)).unwrap();
        ledger.increase_energy(&Id([3; 32]), 77);
        ledger
            .issue_asset(&Id([3; 32]), &AssetName::new("CFB").unwrap(), 0, [0; 7], 9, 1)
            .unwrap();
        ledger.recompute_spectrum_digest();
        ledger.recompute_universe_digest();
        (config, ledger)
    }

    #[test]
    fn test_memory_roundtrip_preserves_digests() {
        let (config, ledger) = populated();
        let store = MemorySnapshotStore::new();
        save_tables(&ledger, &store, 7).unwrap();
        assert!(store.names().contains(&"spectrum.007".to_string()));

        let restored = load_tables(&config, &store, 7, Arc::new(NullSink)).unwrap();
        assert_eq!(restored.spectrum_digest(), ledger.spectrum_digest());
        assert_eq!(restored.universe_digest(), ledger.universe_digest());
        assert_eq!(restored.spectrum_info(), ledger.spectrum_info());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let (config, ledger) = populated();
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        save_tables(&ledger, &store, 83).unwrap();
        assert!(dir.path().join("universe.083").exists());
        let restored = load_tables(&config, &store, 83, Arc::new(NullSink)).unwrap();
        assert_eq!(restored.balance(&Id([3; 32])), 77);
    }

    #[test]
    fn test_missing_or_mismatched_snapshot() {
        let (config, ledger) = populated();
        let store = MemorySnapshotStore::new();
        assert!(load_tables(&config, &store, 1, Arc::new(NullSink)).is_err());
        save_tables(&ledger, &store, 1).unwrap();
        let larger = TableConfig {
            spectrum_depth: 6,
            ..config
        };
        assert!(load_tables(&larger, &store, 1, Arc::new(NullSink)).is_err());
    }
}
