//! The spectrum: an open-addressing table of entity balances
//!
//! ## Layout
//!
//! `2^depth` slots of 64-byte `BalanceRecord`s. A key lives at the first slot
//! reached by linear probing (with wrap-around) from `key.slot(capacity)`.
//! Records are never removed individually; zero balances disappear only
//! when the table is compacted by `reorganize`.
//!
//! ## Anti-dust
//!
//! When a credit arrives while three quarters of the slots are occupied,
//! the lowest balances are burned until fewer than half the slots would be
//! occupied, and the table is compacted before the credit is applied.

use ledger_core::hash::{hash, Digest};
use ledger_core::{DigestTree, Id, LeafSource, LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Encoded size of a balance record
pub const BALANCE_RECORD_SIZE: usize = 64;

/// Number of power-of-two balance categories tracked by the anti-dust pass
pub const ENTITY_CATEGORY_COUNT: usize = 48;

/// Balance and transfer history of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Owner key; zero marks an empty slot
    pub public_key: Id,
    /// Sum of all credits
    pub incoming_amount: i64,
    /// Sum of all debits
    pub outgoing_amount: i64,
    /// Number of credits
    pub number_of_incoming_transfers: u32,
    /// Number of debits
    pub number_of_outgoing_transfers: u32,
    /// Tick of the latest credit
    pub latest_incoming_transfer_tick: u32,
    /// Tick of the latest debit
    pub latest_outgoing_transfer_tick: u32,
}

impl BalanceRecord {
    /// Zeroed record for `key`, as reported for absent entities
    pub fn empty(key: Id) -> Self {
        Self {
            public_key: key,
            ..Self::default()
        }
    }

    /// Spendable balance
    pub fn energy(&self) -> i64 {
        self.incoming_amount - self.outgoing_amount
    }

    /// Whether the slot holding this record is free
    pub fn is_vacant(&self) -> bool {
        self.public_key.is_zero()
    }

    /// Canonical little-endian encoding
    pub fn to_bytes(&self) -> [u8; BALANCE_RECORD_SIZE] {
        let mut out = [0u8; BALANCE_RECORD_SIZE];
        out[..32].copy_from_slice(self.public_key.as_bytes());
        out[32..40].copy_from_slice(&self.incoming_amount.to_le_bytes());
        out[40..48].copy_from_slice(&self.outgoing_amount.to_le_bytes());
        out[48..52].copy_from_slice(&self.number_of_incoming_transfers.to_le_bytes());
        out[52..56].copy_from_slice(&self.number_of_outgoing_transfers.to_le_bytes());
        out[56..60].copy_from_slice(&self.latest_incoming_transfer_tick.to_le_bytes());
        out[60..64].copy_from_slice(&self.latest_outgoing_transfer_tick.to_le_bytes());
        out
    }

    /// Decode the canonical encoding
    pub fn from_bytes(bytes: &[u8; BALANCE_RECORD_SIZE]) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let i64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[at..at + 8]);
            i64::from_le_bytes(b)
        };
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Self {
            public_key: Id(key),
            incoming_amount: i64_at(32),
            outgoing_amount: i64_at(40),
            number_of_incoming_transfers: u32_at(48),
            number_of_outgoing_transfers: u32_at(52),
            latest_incoming_transfer_tick: u32_at(56),
            latest_outgoing_transfer_tick: u32_at(60),
        }
    }
}

/// Aggregate occupancy of the spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpectrumInfo {
    /// Occupied slots, including entities whose balance dropped to zero
    pub number_of_entities: u64,
    /// Energy held by all entities
    pub total_amount: i64,
}

/// Thresholds chosen by an anti-dust pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DustThresholds {
    /// Balances at or below this are burned
    pub burn_all: i64,
    /// Every second balance at or below this is burned
    pub burn_half: i64,
    /// Number of balances in `[2^c, 2^(c+1))` for each category `c`
    pub category_populations: [u32; ENTITY_CATEGORY_COUNT],
}

/// Result of an anti-dust pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DustBurnReport {
    /// Thresholds that were applied
    pub thresholds: DustThresholds,
    /// Burned entities and the balance each lost
    pub burned: Vec<(Id, i64)>,
    /// Occupancy after compaction
    pub info: SpectrumInfo,
}

/// Balance table with its digest tree
#[derive(Debug, Clone)]
pub struct Spectrum {
    records: Vec<BalanceRecord>,
    digests: DigestTree,
    info: SpectrumInfo,
}

struct Leaves<'a>(&'a [BalanceRecord]);

impl LeafSource for Leaves<'_> {
    fn leaf_digest(&self, index: usize) -> Digest {
        hash(&self.0[index].to_bytes())
    }
}

impl Spectrum {
    /// Empty table of `2^depth` slots
    pub fn new(depth: u32) -> Result<Self> {
        let digests = DigestTree::new(depth)?;
        let capacity = digests.leaf_count();
        Ok(Self {
            records: vec![BalanceRecord::default(); capacity],
            digests,
            info: SpectrumInfo::default(),
        })
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Current occupancy
    pub fn info(&self) -> SpectrumInfo {
        self.info
    }

    /// Record in slot `index`
    pub fn record(&self, index: usize) -> &BalanceRecord {
        &self.records[index]
    }

    /// All slots in index order
    pub fn records(&self) -> &[BalanceRecord] {
        &self.records
    }

    /// Slot holding `key`, or `None` for the zero key and absent keys.
    pub fn index_of(&self, key: &Id) -> Option<usize> {
        if key.is_zero() {
            return None;
        }
        let mask = self.capacity() - 1;
        let mut index = key.slot(self.capacity());
        for _ in 0..self.capacity() {
            let record = &self.records[index];
            if record.public_key == *key {
                return Some(index);
            }
            if record.is_vacant() {
                return None;
            }
            index = (index + 1) & mask;
        }
        None
    }

    /// Record of `key`, zeroed if the key is absent
    pub fn entity(&self, key: &Id) -> BalanceRecord {
        self.index_of(key)
            .map(|i| self.records[i])
            .unwrap_or_else(|| BalanceRecord::empty(*key))
    }

    /// Balance in slot `index`
    pub fn energy(&self, index: usize) -> i64 {
        self.records[index].energy()
    }

    /// Whether the next credit triggers an anti-dust pass
    pub fn dust_burn_due(&self) -> bool {
        let capacity = self.capacity() as u64;
        self.info.number_of_entities >= capacity / 2 + capacity / 4
    }

    /// Credit `amount` to `key`, creating its record on first credit.
    ///
    /// The zero key and negative amounts are ignored. Returns the anti-dust
    /// report when the credit had to make room first.
    pub fn increase_energy(&mut self, key: &Id, amount: i64, tick: u32) -> Option<DustBurnReport> {
        if key.is_zero() || amount < 0 {
            return None;
        }

        let report = if self.dust_burn_due() {
            Some(self.burn_dust())
        } else {
            None
        };

        let mask = self.capacity() - 1;
        let mut index = key.slot(self.capacity());
        for _ in 0..self.capacity() {
            let record = &mut self.records[index];
            if record.public_key == *key {
                record.incoming_amount += amount;
                record.number_of_incoming_transfers += 1;
                record.latest_incoming_transfer_tick = tick;
                self.info.total_amount += amount;
                self.digests.mark_dirty(index);
                return report;
            }
            if record.is_vacant() {
                *record = BalanceRecord {
                    public_key: *key,
                    incoming_amount: amount,
                    number_of_incoming_transfers: 1,
                    latest_incoming_transfer_tick: tick,
                    ..BalanceRecord::default()
                };
                self.info.number_of_entities += 1;
                self.info.total_amount += amount;
                self.digests.mark_dirty(index);
                return report;
            }
            index = (index + 1) & mask;
        }

        tracing::warn!(key = %key, amount, "Spectrum full, credit dropped");
        report
    }

    /// Debit `amount` from slot `index` if its balance covers it.
    pub fn decrease_energy(&mut self, index: usize, amount: i64, tick: u32) -> bool {
        if amount < 0 || self.records[index].energy() < amount {
            return false;
        }
        let record = &mut self.records[index];
        record.outgoing_amount += amount;
        record.number_of_outgoing_transfers += 1;
        record.latest_outgoing_transfer_tick = tick;
        self.info.total_amount -= amount;
        self.digests.mark_dirty(index);
        true
    }

    /// Pick burn thresholds that would bring occupancy under half capacity.
    pub fn analyze_dust(&self) -> DustThresholds {
        let mut populations = [0u32; ENTITY_CATEGORY_COUNT];
        for record in &self.records {
            let balance = record.energy();
            if balance > 0 {
                let category = (63 - balance.leading_zeros()) as usize;
                populations[category.min(ENTITY_CATEGORY_COUNT - 1)] += 1;
            }
        }

        let half = self.capacity() as u64 / 2;
        let mut burn_all = 0i64;
        let mut burn_half = 0i64;
        let mut counted = 0u64;
        for category in (0..ENTITY_CATEGORY_COUNT).rev() {
            counted += u64::from(populations[category]);
            if counted >= half {
                if u64::from(populations[category]) == counted {
                    // Everything counted sits in this category: keep half of it.
                    burn_half = (1i64 << (category + 1)) - 1;
                    burn_all = (1i64 << category) - 1;
                } else {
                    burn_all = (1i64 << (category + 1)) - 1;
                }
                break;
            }
        }

        DustThresholds {
            burn_all,
            burn_half,
            category_populations: populations,
        }
    }

    /// Run an anti-dust pass and compact the table.
    pub fn burn_dust(&mut self) -> DustBurnReport {
        let thresholds = self.analyze_dust();
        let mut burned = Vec::new();

        if thresholds.burn_all > 0 {
            for record in &mut self.records {
                let balance = record.energy();
                if balance != 0 && balance <= thresholds.burn_all {
                    record.outgoing_amount = record.incoming_amount;
                    burned.push((record.public_key, balance));
                }
            }
        }

        if thresholds.burn_half > 0 {
            let mut candidates = 0u64;
            for record in &mut self.records {
                let balance = record.energy();
                if balance != 0 && balance <= thresholds.burn_half {
                    candidates += 1;
                    if candidates & 1 == 1 {
                        record.outgoing_amount = record.incoming_amount;
                        burned.push((record.public_key, balance));
                    }
                }
            }
        }

        self.reorganize();
        tracing::info!(
            burned = burned.len(),
            burn_all = thresholds.burn_all,
            burn_half = thresholds.burn_half,
            entities = self.info.number_of_entities,
            "Spectrum dust burned"
        );

        DustBurnReport {
            thresholds,
            burned,
            info: self.info,
        }
    }

    /// Rebuild the table keeping only non-zero balances, then rehash everything.
    pub fn reorganize(&mut self) {
        let capacity = self.capacity();
        let mask = capacity - 1;
        let mut compacted = vec![BalanceRecord::default(); capacity];
        for record in self.records.iter().filter(|r| r.energy() != 0) {
            let mut index = record.public_key.slot(capacity);
            while !compacted[index].is_vacant() {
                index = (index + 1) & mask;
            }
            compacted[index] = *record;
        }
        self.records = compacted;
        self.update_info();
        self.digests.rebuild(&Leaves(&self.records));
    }

    /// Recount occupancy from the records.
    pub fn update_info(&mut self) {
        let mut info = SpectrumInfo::default();
        for record in &self.records {
            let balance = record.energy();
            if balance != 0 || !record.is_vacant() {
                info.number_of_entities += 1;
                info.total_amount += balance;
            }
        }
        self.info = info;
    }

    /// Rehash changed leaves and return the root.
    pub fn recompute_digest(&mut self) -> Digest {
        self.digests.recompute(&Leaves(&self.records))
    }

    /// Root as of the last recompute
    pub fn digest(&self) -> Digest {
        self.digests.root()
    }

    /// Sibling path of slot `index` as of the last recompute
    pub fn siblings(&self, index: usize) -> Vec<Digest> {
        self.digests.siblings(index)
    }

    /// Key in the next occupied slot after `key`, or zero
    pub fn next_id(&self, key: &Id) -> Id {
        let start = self.index_of(key).map_or(0, |i| i + 1);
        self.records[start.min(self.capacity())..]
            .iter()
            .find(|r| !r.is_vacant())
            .map_or(Id::ZERO, |r| r.public_key)
    }

    /// Key in the previous occupied slot before `key`, or zero
    pub fn prev_id(&self, key: &Id) -> Id {
        let Some(end) = self.index_of(key) else {
            return Id::ZERO;
        };
        self.records[..end]
            .iter()
            .rev()
            .find(|r| !r.is_vacant())
            .map_or(Id::ZERO, |r| r.public_key)
    }

    /// Concatenated canonical records
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.capacity() * BALANCE_RECORD_SIZE);
        for record in &self.records {
            out.extend_from_slice(&record.to_bytes());
        }
        out
    }

    /// Decode a snapshot of `2^depth` records and rebuild digests.
    pub fn from_bytes(depth: u32, bytes: &[u8]) -> Result<Self> {
        let mut spectrum = Self::new(depth)?;
        if bytes.len() != spectrum.capacity() * BALANCE_RECORD_SIZE {
            return Err(LedgerError::decode(format!(
                "spectrum snapshot has {} bytes, expected {}",
                bytes.len(),
                spectrum.capacity() * BALANCE_RECORD_SIZE
            )));
        }
        for (slot, chunk) in bytes.chunks_exact(BALANCE_RECORD_SIZE).enumerate() {
            let mut raw = [0u8; BALANCE_RECORD_SIZE];
            raw.copy_from_slice(chunk);
            spectrum.records[slot] = BalanceRecord::from_bytes(&raw);
        }
        spectrum.update_info();
        spectrum.digests.rebuild(&Leaves(&spectrum.records));
        Ok(spectrum)
    }
}
