//! Ledger State - the spectrum and the universe
//!
//! Two open-addressing tables with incremental digests:
//!
//! - `Spectrum`: balance records keyed by entity id
//! - `Universe`: issuance, ownership and possession records of assets
//!
//! `LedgerState` wraps both behind their locks and implements the
//! deterministic operations (energy transfers, share transfers, asset
//! issuance, IPO bidding and settlement) that transaction replay and
//! contracts use, logging every change as a `LedgerEvent`.

#![forbid(unsafe_code)]

/// Universe records and the asset table
pub mod assets;

/// Table sizing
pub mod config;

/// IPO order books
pub mod ipo;

/// Ledger operations
pub mod ledger;

/// Table snapshots
pub mod snapshot;

/// Balance records and the balance table
pub mod spectrum;

pub use assets::{AssetName, AssetRecord, Issued, ShareTransfer, Universe, NO_ASSET_INDEX};
pub use config::TableConfig;
pub use ipo::{BidPlacement, IpoBook};
pub use ledger::{IpoSettlement, LedgerState};
pub use snapshot::{load_tables, save_tables};
pub use spectrum::{BalanceRecord, DustBurnReport, Spectrum, SpectrumInfo};
