//! Property tests for the ledger tables
//!
//! - conservation: circulating energy equals credits minus debits minus burns
//! - open addressing: every key is reachable from its home slot
//! - digests: incremental recomputation equals a full rebuild
//! - IPO bids neither create nor destroy energy

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_core::{Id, NullSink};
use ledger_state::{IpoBook, LedgerState, Spectrum, TableConfig};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Credit { key: u8, amount: i64 },
    Debit { key: u8, amount: i64 },
    Transfer { from: u8, to: u8, amount: i64 },
    Burn { key: u8, amount: i64 },
}

fn entity(n: u8) -> Id {
    let mut bytes = [0x5a; 32];
    bytes[0] = n;
    bytes[1] = n.wrapping_mul(31);
    Id(bytes)
}

fn arb_op() -> impl Strategy<Value = Op> {
    let key = 1u8..40;
    let amount = 0i64..10_000;
    prop_oneof![
        (key.clone(), amount.clone()).prop_map(|(key, amount)| Op::Credit { key, amount }),
        (key.clone(), amount.clone()).prop_map(|(key, amount)| Op::Debit { key, amount }),
        (key.clone(), key.clone(), amount.clone()).prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (key, amount).prop_map(|(key, amount)| Op::Burn { key, amount }),
    ]
}

fn ledger() -> LedgerState {
    let config = TableConfig {
        spectrum_depth: 7,
        asset_depth: 4,
    };
    LedgerState::new(&config, Arc::new(NullSink)).unwrap()
}

proptest! {
    #[test]
    fn energy_is_conserved(ops in prop::collection::vec(arb_op(), 1..120)) {
        let ledger = ledger();
        let mut expected = 0i64;
        for op in ops {
            match op {
                Op::Credit { key, amount } => {
                    ledger.increase_energy(&entity(key), amount);
                    expected += amount;
                }
                Op::Debit { key, amount } => {
                    if let Some(index) = ledger.spectrum_index(&entity(key)) {
                        if ledger.decrease_energy(index, amount) {
                            expected -= amount;
                        }
                    }
                }
                Op::Transfer { from, to, amount } => {
                    let remaining = ledger.transfer(&entity(from), &entity(to), amount);
                    prop_assert!(remaining >= 0 || ledger.spectrum_index(&entity(from)).map_or(true, |i| ledger.energy(i) < amount));
                }
                Op::Burn { key, amount } => {
                    if ledger.burn(&entity(key), amount) >= 0 {
                        expected -= amount;
                    }
                }
            }
            prop_assert_eq!(ledger.spectrum_info().total_amount, expected);
        }
        let summed: i64 = ledger.with_spectrum(|s| s.records().iter().map(|r| r.energy()).sum());
        prop_assert_eq!(summed, expected);
    }

    #[test]
    fn keys_reachable_from_home_slot(keys in prop::collection::vec(any::<[u8; 32]>(), 1..60)) {
        let mut spectrum = Spectrum::new(7).unwrap();
        for key in &keys {
            spectrum.increase_energy(&Id(*key), 1, 0);
        }
        for key in keys.iter().map(|k| Id(*k)).filter(|k| !k.is_zero()) {
            let index = spectrum.index_of(&key);
            prop_assert!(index.is_some());
            let mut probe = key.slot(spectrum.capacity());
            while Some(probe) != index {
                prop_assert!(!spectrum.record(probe).is_vacant());
                probe = (probe + 1) % spectrum.capacity();
            }
        }
    }

    #[test]
    fn incremental_digest_matches_rebuild(credits in prop::collection::vec((1u8..40, 1i64..1000), 1..50)) {
        let mut spectrum = Spectrum::new(6).unwrap();
        spectrum.recompute_digest();
        for (key, amount) in credits {
            spectrum.increase_energy(&entity(key), amount, 1);
            spectrum.recompute_digest();
        }
        let restored = Spectrum::from_bytes(6, &spectrum.to_bytes()).unwrap();
        prop_assert_eq!(restored.digest(), spectrum.digest());
    }

    #[test]
    fn ipo_bids_conserve_energy(bids in prop::collection::vec((1u8..8, 1i64..500, 1u16..6), 1..30)) {
        let ledger = ledger();
        for n in 1..8u8 {
            ledger.increase_energy(&entity(n), 5_000);
        }
        let mut book = IpoBook::new(5);
        for (bidder, price, quantity) in bids {
            let _ = ledger.bid_in_ipo(&mut book, &entity(bidder), price, quantity);
        }
        let in_book: i64 = (0..book.shares()).map(|i| book.price(i)).sum();
        prop_assert_eq!(ledger.spectrum_info().total_amount + in_book, 35_000);
    }
}
