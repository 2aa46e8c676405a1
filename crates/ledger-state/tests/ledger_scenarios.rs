//! End-to-end ledger scenarios
//!
//! - issuing and splitting an asset between two holders
//! - failed debits and share transfers leave every table untouched
//! - epoch compaction keeps balances and positive possessions

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_core::{EventLog, Id, LedgerEvent};
use ledger_state::{AssetName, LedgerState, TableConfig};
use std::sync::Arc;

fn entity(n: u8) -> Id {
    Id([n; 32])
}

fn ledger() -> (LedgerState, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let config = TableConfig {
        spectrum_depth: 8,
        asset_depth: 8,
    };
    (LedgerState::new(&config, log.clone()).unwrap(), log)
}

#[test]
fn test_issue_then_split_asset() {
    let (ledger, log) = ledger();
    let name = AssetName::new("QUBIC").unwrap();
    let (a, b) = (entity(0xA1), entity(0xB2));

    let issued = ledger.issue_asset(&a, &name, 0, [0; 7], 1000, 1).unwrap();
    assert!(ledger.transfer_asset_ownership_and_possession(issued.ownership, issued.possession, &b, 300));

    assert_eq!(ledger.number_of_possessed_shares(&name, &a, &a, &a, 1, 1), 700);
    assert_eq!(ledger.number_of_possessed_shares(&name, &a, &b, &b, 1, 1), 300);
    let total = ledger.with_universe(|u| u.number_of_shares(issued.issuance));
    assert_eq!(total, 1000);

    let events: Vec<_> = log.entries().into_iter().map(|e| e.event).collect();
    assert!(matches!(events[0], LedgerEvent::AssetIssuance { units: 1000, .. }));
    assert!(matches!(events[1], LedgerEvent::AssetOwnershipChange { units: 300, .. }));
    assert!(matches!(events[2], LedgerEvent::AssetPossessionChange { units: 300, .. }));
}

#[test]
fn test_failed_share_transfer_is_atomic() {
    let (ledger, log) = ledger();
    let name = AssetName::new("QUBIC").unwrap();
    let a = entity(0xA1);
    let issued = ledger.issue_asset(&a, &name, 0, [0; 7], 10, 1).unwrap();
    let root = ledger.recompute_universe_digest();
    let logged = log.len();

    for _ in 0..3 {
        assert!(!ledger.transfer_asset_ownership_and_possession(
            issued.ownership,
            issued.possession,
            &entity(2),
            11
        ));
        assert!(!ledger.transfer_asset_ownership_and_possession(
            issued.ownership,
            issued.possession,
            &entity(2),
            0
        ));
    }
    assert_eq!(ledger.recompute_universe_digest(), root);
    assert_eq!(log.len(), logged);
}

#[test]
fn test_overdraft_leaves_balance() {
    let (ledger, _) = ledger();
    ledger.increase_energy(&entity(1), 500);
    let index = ledger.spectrum_index(&entity(1)).unwrap();
    let before = ledger.recompute_spectrum_digest();

    assert!(!ledger.decrease_energy(index, 501));
    assert_eq!(ledger.energy(index), 500);
    assert_eq!(ledger.recompute_spectrum_digest(), before);
}

#[test]
fn test_epoch_compaction_keeps_live_state() {
    let (ledger, _) = ledger();
    let name = AssetName::new("CFB").unwrap();
    for n in 1..=20u8 {
        ledger.increase_energy(&entity(n), i64::from(n) * 10);
    }
    for n in 1..=5u8 {
        let index = ledger.spectrum_index(&entity(n)).unwrap();
        assert!(ledger.decrease_energy(index, i64::from(n) * 10));
    }
    let issued = ledger.issue_asset(&entity(9), &name, 0, [0; 7], 50, 1).unwrap();
    assert!(ledger.transfer_asset_ownership_and_possession(issued.ownership, issued.possession, &entity(10), 50));

    let supply = ledger.spectrum_info().total_amount;
    ledger.reorganize_spectrum();
    ledger.assets_end_epoch();

    let info = ledger.spectrum_info();
    assert_eq!(info.total_amount, supply);
    assert_eq!(info.number_of_entities, 15);
    assert_eq!(ledger.spectrum_index(&entity(1)), None);
    assert_eq!(ledger.balance(&entity(20)), 200);
    assert_eq!(ledger.number_of_possessed_shares(&name, &entity(9), &entity(10), &entity(10), 1, 1), 50);
    assert_eq!(ledger.with_universe(|u| u.occupied()), 3);
}

#[test]
fn test_entity_iteration() {
    let (ledger, _) = ledger();
    ledger.increase_energy(&entity(3), 1);
    ledger.increase_energy(&entity(7), 1);
    assert_eq!(ledger.next_id(&Id::ZERO), entity(3));
    assert_eq!(ledger.next_id(&entity(3)), entity(7));
    assert_eq!(ledger.next_id(&entity(7)), Id::ZERO);
    assert_eq!(ledger.prev_id(&entity(7)), entity(3));
    assert_eq!(ledger.prev_id(&entity(3)), Id::ZERO);
}
