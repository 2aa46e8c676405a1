//! Deterministic ledger operations over the spectrum and the universe
//!
//! `LedgerState` owns both tables, each behind its own mutex, and reports
//! every mutation to an `EventSink`. Operations never panic on bad input:
//! they return a sentinel, `false` or `None` and leave the tables untouched.
//!
//! Contract-specific follow-ups (incoming-transfer callbacks, fee reserves)
//! belong to the contract runtime; this layer only moves energy and shares.

use crate::assets::{AssetName, AssetRecord, Issued, Universe};
use crate::config::TableConfig;
use crate::ipo::{BidPlacement, IpoBook};
use crate::spectrum::{BalanceRecord, DustBurnReport, Spectrum, SpectrumInfo};
use ledger_core::params::{MAX_AMOUNT, REJECTED_TRANSFER};
use ledger_core::{Digest, EventSink, Id, LedgerEvent, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Result of settling one IPO
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IpoSettlement {
    /// Clearing price per share, zero if the IPO failed
    pub final_price: i64,
    /// Excess bids returned, first-seen order
    pub refunds: Vec<(Id, i64)>,
    /// Shares handed to bidders
    pub shares_distributed: u32,
}

impl IpoSettlement {
    /// Amount raised for the contract's fee reserve
    pub fn proceeds(&self, shares: usize) -> i64 {
        self.final_price * shares as i64
    }
}

/// The spectrum and universe of one node
pub struct LedgerState {
    spectrum: Mutex<Spectrum>,
    universe: Mutex<Universe>,
    tick: AtomicU32,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerState")
            .field("tick", &self.tick())
            .field("spectrum", &self.spectrum_info())
            .finish_non_exhaustive()
    }
}

impl LedgerState {
    /// Empty tables sized by `config`
    pub fn new(config: &TableConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self::from_tables(
            Spectrum::new(config.spectrum_depth)?,
            Universe::new(config.asset_depth)?,
            events,
        ))
    }

    /// Wrap existing tables, e.g. restored from a snapshot
    pub fn from_tables(spectrum: Spectrum, universe: Universe, events: Arc<dyn EventSink>) -> Self {
        Self {
            spectrum: Mutex::new(spectrum),
            universe: Mutex::new(universe),
            tick: AtomicU32::new(0),
            events,
        }
    }

    /// Tick stamped into balance records
    pub fn tick(&self) -> u32 {
        self.tick.load(Ordering::Acquire)
    }

    /// Set the tick stamped into subsequent balance updates
    pub fn set_tick(&self, tick: u32) {
        self.tick.store(tick, Ordering::Release);
    }

    /// Shared event sink
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Run `f` with the spectrum locked
    pub fn with_spectrum<R>(&self, f: impl FnOnce(&Spectrum) -> R) -> R {
        f(&self.spectrum.lock())
    }

    /// Run `f` with the universe locked
    pub fn with_universe<R>(&self, f: impl FnOnce(&Universe) -> R) -> R {
        f(&self.universe.lock())
    }

    fn report_dust(&self, report: Option<DustBurnReport>) {
        let Some(report) = report else {
            return;
        };
        self.events.record(LedgerEvent::DustBurning {
            burned: report.burned,
        });
        self.events.record(LedgerEvent::SpectrumStats {
            total_amount: report.info.total_amount,
            burn_all_threshold: report.thresholds.burn_all,
            burn_half_threshold: report.thresholds.burn_half,
            entities: report.info.number_of_entities,
        });
    }

    fn credit(&self, spectrum: &mut Spectrum, key: &Id, amount: i64) {
        let report = spectrum.increase_energy(key, amount, self.tick());
        self.report_dust(report);
    }

    // ---------------------------------------------------------------------
    // Spectrum
    // ---------------------------------------------------------------------

    /// Slot of `key` in the spectrum
    pub fn spectrum_index(&self, key: &Id) -> Option<usize> {
        self.spectrum.lock().index_of(key)
    }

    /// Balance in slot `index`
    pub fn energy(&self, index: usize) -> i64 {
        self.spectrum.lock().energy(index)
    }

    /// Balance of `key`, zero when absent
    pub fn balance(&self, key: &Id) -> i64 {
        self.spectrum.lock().entity(key).energy()
    }

    /// Balance record of `key`, zeroed when absent
    pub fn entity(&self, key: &Id) -> BalanceRecord {
        self.spectrum.lock().entity(key)
    }

    /// Occupancy and circulating energy
    pub fn spectrum_info(&self) -> SpectrumInfo {
        self.spectrum.lock().info()
    }

    /// Key after `key` in slot order
    pub fn next_id(&self, key: &Id) -> Id {
        self.spectrum.lock().next_id(key)
    }

    /// Key before `key` in slot order
    pub fn prev_id(&self, key: &Id) -> Id {
        self.spectrum.lock().prev_id(key)
    }

    /// Credit newly created energy to `key` and log it as coming from the zero id.
    ///
    /// Zero keys and negative amounts are ignored.
    pub fn increase_energy(&self, key: &Id, amount: i64) {
        if key.is_zero() || amount < 0 {
            return;
        }
        let mut spectrum = self.spectrum.lock();
        self.credit(&mut spectrum, key, amount);
        drop(spectrum);
        self.events.record(LedgerEvent::QuTransfer {
            source: Id::ZERO,
            destination: *key,
            amount,
        });
    }

    /// Debit `amount` from slot `index`; `false` and no change if it cannot be covered.
    pub fn decrease_energy(&self, index: usize, amount: i64) -> bool {
        let tick = self.tick();
        self.spectrum.lock().decrease_energy(index, amount, tick)
    }

    /// Move `amount` from the entity in slot `source_index` to `destination`.
    ///
    /// Used for transaction replay where the source slot is already known.
    /// Logs one transfer event on success.
    pub fn move_energy(&self, source_index: usize, destination: &Id, amount: i64) -> bool {
        let mut spectrum = self.spectrum.lock();
        let source = spectrum.record(source_index).public_key;
        if !spectrum.decrease_energy(source_index, amount, self.tick()) {
            return false;
        }
        self.credit(&mut spectrum, destination, amount);
        drop(spectrum);
        self.events.record(LedgerEvent::QuTransfer {
            source,
            destination: *destination,
            amount,
        });
        true
    }

    /// Transfer `amount` from `source` to `destination`.
    ///
    /// Returns the source's remaining balance on success. Failures return a
    /// negative value and change nothing:
    /// - `REJECTED_TRANSFER` when `amount` is outside `0..=MAX_AMOUNT`
    /// - `-amount` when `source` has no record
    /// - the (negative) shortfall when the balance is insufficient
    pub fn transfer(&self, source: &Id, destination: &Id, amount: i64) -> i64 {
        if !(0..=MAX_AMOUNT).contains(&amount) {
            return REJECTED_TRANSFER;
        }
        let mut spectrum = self.spectrum.lock();
        let Some(index) = spectrum.index_of(source) else {
            return -amount;
        };
        let remaining = spectrum.energy(index) - amount;
        if remaining < 0 {
            return remaining;
        }
        spectrum.decrease_energy(index, amount, self.tick());
        self.credit(&mut spectrum, destination, amount);
        drop(spectrum);

        self.events.record(LedgerEvent::QuTransfer {
            source: *source,
            destination: *destination,
            amount,
        });
        tracing::trace!(source = %source, destination = %destination, amount, "Energy transferred");
        remaining
    }

    /// Destroy `amount` of `source`'s energy. Same return convention as `transfer`.
    ///
    /// The caller is responsible for crediting the burned amount to a fee reserve.
    pub fn burn(&self, source: &Id, amount: i64) -> i64 {
        if !(0..=MAX_AMOUNT).contains(&amount) {
            return REJECTED_TRANSFER;
        }
        let mut spectrum = self.spectrum.lock();
        let Some(index) = spectrum.index_of(source) else {
            return -amount;
        };
        let remaining = spectrum.energy(index) - amount;
        if remaining < 0 {
            return remaining;
        }
        spectrum.decrease_energy(index, amount, self.tick());
        drop(spectrum);

        self.events.record(LedgerEvent::Burning {
            source: *source,
            amount,
        });
        remaining
    }

    /// Pay every `(destination, amount)` from `source` in one step.
    ///
    /// Either all payouts happen or none: `false` if an amount is negative,
    /// the sum overflows `MAX_AMOUNT` or `source` cannot cover it.
    pub fn distribute(&self, source: &Id, payouts: &[(Id, i64)]) -> bool {
        let mut total: i64 = 0;
        for (_, amount) in payouts {
            if *amount < 0 {
                return false;
            }
            match total.checked_add(*amount) {
                Some(sum) if sum <= MAX_AMOUNT => total = sum,
                _ => return false,
            }
        }
        let mut spectrum = self.spectrum.lock();
        let Some(index) = spectrum.index_of(source) else {
            return total == 0;
        };
        if !spectrum.decrease_energy(index, total, self.tick()) {
            return false;
        }
        for (destination, amount) in payouts {
            self.credit(&mut spectrum, destination, *amount);
        }
        drop(spectrum);
        for (destination, amount) in payouts {
            self.events.record(LedgerEvent::QuTransfer {
                source: *source,
                destination: *destination,
                amount: *amount,
            });
        }
        true
    }

    /// Compact the spectrum, dropping every zero balance
    pub fn reorganize_spectrum(&self) {
        self.spectrum.lock().reorganize();
    }

    /// Rehash changed balance leaves
    pub fn recompute_spectrum_digest(&self) -> Digest {
        self.spectrum.lock().recompute_digest()
    }

    /// Spectrum root as of the last recompute
    pub fn spectrum_digest(&self) -> Digest {
        self.spectrum.lock().digest()
    }

    /// Inclusion path for spectrum slot `index`
    pub fn spectrum_siblings(&self, index: usize) -> Vec<Digest> {
        self.spectrum.lock().siblings(index)
    }

    // ---------------------------------------------------------------------
    // Universe
    // ---------------------------------------------------------------------

    /// Issue a new asset wholly owned and possessed by `issuer`.
    pub fn issue_asset(
        &self,
        issuer: &Id,
        name: &AssetName,
        decimals: i8,
        unit: [u8; 7],
        units: i64,
        managing_contract: u16,
    ) -> Option<Issued> {
        let issued = self
            .universe
            .lock()
            .issue(issuer, name, decimals, unit, units, managing_contract)?;
        self.events.record(LedgerEvent::AssetIssuance {
            issuer: *issuer,
            units,
            name: *name.as_bytes(),
            decimals,
            unit,
        });
        tracing::debug!(issuer = %issuer, asset = %name, units, "Asset issued");
        Some(issued)
    }

    /// Move `units` shares from an ownership/possession pair to `destination`.
    ///
    /// Logs an ownership change and a possession change on success; on any
    /// failure nothing changes and `false` is returned.
    pub fn transfer_asset_ownership_and_possession(
        &self,
        ownership_index: usize,
        possession_index: usize,
        destination: &Id,
        units: i64,
    ) -> bool {
        let mut universe = self.universe.lock();
        self.move_shares(&mut universe, ownership_index, possession_index, destination, units)
    }

    fn move_shares(
        &self,
        universe: &mut Universe,
        ownership_index: usize,
        possession_index: usize,
        destination: &Id,
        units: i64,
    ) -> bool {
        let Some(moved) =
            universe.transfer_ownership_and_possession(ownership_index, possession_index, destination, units)
        else {
            return false;
        };
        let AssetRecord::Issuance {
            public_key: issuer,
            name,
            decimals,
            unit,
        } = *universe.record(moved.issuance)
        else {
            return true;
        };
        self.events.record(LedgerEvent::AssetOwnershipChange {
            source: moved.source_owner,
            destination: *destination,
            issuer,
            units,
            name: *name.as_bytes(),
            decimals,
            unit,
        });
        self.events.record(LedgerEvent::AssetPossessionChange {
            source: moved.source_possessor,
            destination: *destination,
            issuer,
            units,
            name: *name.as_bytes(),
            decimals,
            unit,
        });
        true
    }

    /// Transfer shares on behalf of `managing_contract`, looked up by keys.
    ///
    /// Returns the possessor's remaining shares on success. Failures change
    /// nothing and return:
    /// - `REJECTED_TRANSFER` when `units` is outside `0..=MAX_AMOUNT`
    /// - `-units` when a record is missing or managed by another contract
    /// - the (negative) shortfall when too few shares are possessed
    pub fn transfer_share_ownership_and_possession(
        &self,
        name: &AssetName,
        issuer: &Id,
        owner: &Id,
        possessor: &Id,
        units: i64,
        new_owner: &Id,
        managing_contract: u16,
    ) -> i64 {
        if !(0..=MAX_AMOUNT).contains(&units) {
            return REJECTED_TRANSFER;
        }
        let mut universe = self.universe.lock();
        let Some(issuance) = universe.issuance_index(issuer, name) else {
            return -units;
        };
        let Some(ownership) = universe.ownership_index(issuance, owner, managing_contract) else {
            return -units;
        };
        let Some(possession) = universe.possession_index(ownership, possessor, managing_contract) else {
            return -units;
        };
        let AssetRecord::Possession { units: possessed, .. } = *universe.record(possession) else {
            return -units;
        };
        let remaining = possessed - units;
        if remaining < 0 {
            return remaining;
        }
        if units > 0 && !self.move_shares(&mut universe, ownership, possession, new_owner, units) {
            return -units;
        }
        remaining
    }

    /// Shares of `name` by `issuer` owned by `owner` and possessed by `possessor`
    pub fn number_of_possessed_shares(
        &self,
        name: &AssetName,
        issuer: &Id,
        owner: &Id,
        possessor: &Id,
        ownership_managing_contract: u16,
        possession_managing_contract: u16,
    ) -> i64 {
        self.universe.lock().number_of_possessed_shares(
            name,
            issuer,
            owner,
            possessor,
            ownership_managing_contract,
            possession_managing_contract,
        )
    }

    /// Slot of the issuance of `name` by `issuer`
    pub fn issuance_index(&self, issuer: &Id, name: &AssetName) -> Option<usize> {
        self.universe.lock().issuance_index(issuer, name)
    }

    /// Every possession of the asset, as `(possessor, units)` pairs with positive units
    pub fn possessors(&self, issuer: &Id, name: &AssetName) -> Vec<(Id, i64)> {
        let universe = self.universe.lock();
        let Some(issuance) = universe.issuance_index(issuer, name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for ownership in universe.children(issuance) {
            for possession in universe.children(ownership) {
                if let AssetRecord::Possession {
                    public_key, units, ..
                } = *universe.record(possession)
                {
                    if units > 0 {
                        out.push((public_key, units));
                    }
                }
            }
        }
        out
    }

    /// Compact the universe, dropping records without positive possessions
    pub fn assets_end_epoch(&self) {
        self.universe.lock().end_epoch();
    }

    /// Rehash changed asset leaves
    pub fn recompute_universe_digest(&self) -> Digest {
        self.universe.lock().recompute_digest()
    }

    /// Universe root as of the last recompute
    pub fn universe_digest(&self) -> Digest {
        self.universe.lock().digest()
    }

    // ---------------------------------------------------------------------
    // IPO
    // ---------------------------------------------------------------------

    /// Place an IPO bid of `quantity` shares at `price` each.
    ///
    /// Valid iff `0 < price <= MAX_AMOUNT / shares` and
    /// `0 < quantity <= shares`, and `source` can pay `price * quantity`.
    /// Returns `None` without any change otherwise. Refunds (including
    /// units that did not enter the book) are credited before returning.
    pub fn bid_in_ipo(&self, book: &mut IpoBook, source: &Id, price: i64, quantity: u16) -> Option<BidPlacement> {
        let shares = book.shares();
        if shares == 0
            || price <= 0
            || price > MAX_AMOUNT / shares as i64
            || quantity == 0
            || usize::from(quantity) > shares
        {
            return None;
        }
        let cost = price * i64::from(quantity);

        let mut spectrum = self.spectrum.lock();
        let index = spectrum.index_of(source)?;
        if !spectrum.decrease_energy(index, cost, self.tick()) {
            return None;
        }
        self.events.record(LedgerEvent::QuTransfer {
            source: *source,
            destination: Id::ZERO,
            amount: cost,
        });

        let placement = book.place(source, price, quantity);
        for (key, amount) in &placement.refunds {
            self.credit(&mut spectrum, key, *amount);
            self.events.record(LedgerEvent::QuTransfer {
                source: Id::ZERO,
                destination: *key,
                amount: *amount,
            });
        }
        tracing::debug!(
            bidder = %source,
            price,
            quantity,
            registered = placement.registered,
            "IPO bid placed"
        );
        Some(placement)
    }

    /// Settle an IPO at the price of slot `clearing_slot`.
    ///
    /// Issues `book.shares()` shares named `asset_name` from the zero issuer,
    /// managed by `exchange_contract`, hands one share to each slot's bidder
    /// and refunds every bid priced above the clearing price by the excess.
    /// If the clearing price is zero or the issuance fails, every bid is
    /// refunded in full and no shares are created.
    pub fn settle_ipo(
        &self,
        book: &IpoBook,
        asset_name: &AssetName,
        clearing_slot: usize,
        exchange_contract: u16,
    ) -> IpoSettlement {
        let shares = book.shares();
        let mut settlement = IpoSettlement {
            final_price: if clearing_slot < shares { book.price(clearing_slot) } else { 0 },
            ..IpoSettlement::default()
        };

        let mut issued = None;
        if settlement.final_price > 0 {
            issued = self.issue_asset(
                &Id::ZERO,
                asset_name,
                0,
                [0; 7],
                shares as i64,
                exchange_contract,
            );
            if issued.is_none() {
                tracing::warn!(asset = %asset_name, "IPO share issuance failed, bids refunded");
                settlement.final_price = 0;
            }
        }

        for slot in 0..shares {
            let bidder = book.bidder(slot);
            let price = book.price(slot);
            let excess = price - settlement.final_price;
            if excess > 0 {
                match settlement.refunds.iter_mut().find(|(k, _)| *k == bidder) {
                    Some((_, total)) => *total += excess,
                    None => settlement.refunds.push((bidder, excess)),
                }
            }
            if let Some(issued) = &issued {
                if self.transfer_asset_ownership_and_possession(issued.ownership, issued.possession, &bidder, 1) {
                    settlement.shares_distributed += 1;
                }
            }
        }

        for (key, amount) in &settlement.refunds {
            self.increase_energy(key, *amount);
        }
        tracing::info!(
            asset = %asset_name,
            final_price = settlement.final_price,
            shares = settlement.shares_distributed,
            "IPO settled"
        );
        settlement
    }
}
