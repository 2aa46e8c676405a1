//! The universe: issuance, ownership and possession records of assets
//!
//! ## Layout
//!
//! One open-addressing table of `2^depth` 48-byte slots shared by three
//! record kinds. An issuance lives near its issuer's slot, an ownership near
//! its owner's slot and a possession near its possessor's slot:
//!
//! - every `Ownership` points at the `Issuance` it holds shares of
//! - every `Possession` points at the `Ownership` it holds shares of
//!
//! Ownerships and possessions are created lazily by transfers and dropped
//! only when `end_epoch` compacts the table.
//!
//! ## Index lists
//!
//! Singly linked lists (new entries prepended) chain every issuance, every
//! ownership of an issuance and every possession of an ownership, so share
//! counts do not need full-table scans.

use ledger_core::hash::{hash, Digest};
use ledger_core::params::MAX_AMOUNT;
use ledger_core::{DigestTree, Id, LeafSource, LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded size of an asset record
pub const ASSET_RECORD_SIZE: usize = 48;

/// End-of-list marker in the index lists
pub const NO_ASSET_INDEX: u32 = u32::MAX;

/// Longest asset name
pub const MAX_ASSET_NAME_LEN: usize = 6;

const TYPE_EMPTY: u8 = 0;
const TYPE_ISSUANCE: u8 = 1;
const TYPE_OWNERSHIP: u8 = 2;
const TYPE_POSSESSION: u8 = 3;

/// Zero-padded asset name: one to six characters, `A-Z` first, then `A-Z0-9`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AssetName([u8; 7]);

impl AssetName {
    /// Validate and pad `name`
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_ASSET_NAME_LEN {
            return Err(LedgerError::invalid(format!(
                "asset name {name:?} must have 1 to {MAX_ASSET_NAME_LEN} characters"
            )));
        }
        let mut raw = [0u8; 7];
        raw[..bytes.len()].copy_from_slice(bytes);
        let candidate = Self(raw);
        if !candidate.is_valid() {
            return Err(LedgerError::invalid(format!("asset name {name:?} is malformed")));
        }
        Ok(candidate)
    }

    /// Wrap raw bytes without validation
    pub const fn from_raw(raw: [u8; 7]) -> Self {
        Self(raw)
    }

    /// Name from the low seven bytes of a little-endian integer
    pub fn from_u64(value: u64) -> Self {
        let mut raw = [0u8; 7];
        raw.copy_from_slice(&value.to_le_bytes()[..7]);
        Self(raw)
    }

    /// Little-endian integer form
    pub fn to_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..7].copy_from_slice(&self.0);
        u64::from_le_bytes(bytes)
    }

    /// Raw padded bytes
    pub fn as_bytes(&self) -> &[u8; 7] {
        &self.0
    }

    /// Whether the bytes form a well-formed name
    pub fn is_valid(&self) -> bool {
        if !self.0[0].is_ascii_uppercase() || self.0[MAX_ASSET_NAME_LEN] != 0 {
            return false;
        }
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(7);
        self.0[1..len]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            && self.0[len..].iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(7);
        f.write_str(&String::from_utf8_lossy(&self.0[..len]))
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetName({self})")
    }
}

/// One universe slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssetRecord {
    /// Free slot
    #[default]
    Empty,
    /// An asset definition
    Issuance {
        /// Issuer key
        public_key: Id,
        /// Asset name
        name: AssetName,
        /// Decimal places of a share
        decimals: i8,
        /// Unit of measurement, zero padded
        unit: [u8; 7],
    },
    /// Shares owned by one entity under one managing contract
    Ownership {
        /// Owner key
        public_key: Id,
        /// Contract allowed to move these shares
        managing_contract: u16,
        /// Slot of the issuance
        issuance_index: u32,
        /// Shares owned
        units: i64,
    },
    /// Shares possessed by one entity under one managing contract
    Possession {
        /// Possessor key
        public_key: Id,
        /// Contract allowed to move these shares
        managing_contract: u16,
        /// Slot of the ownership
        ownership_index: u32,
        /// Shares possessed
        units: i64,
    },
}

impl AssetRecord {
    /// Whether the slot is free
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Key of the record, zero for empty slots
    pub fn public_key(&self) -> Id {
        match self {
            Self::Empty => Id::ZERO,
            Self::Issuance { public_key, .. }
            | Self::Ownership { public_key, .. }
            | Self::Possession { public_key, .. } => *public_key,
        }
    }

    /// Canonical encoding: key, type byte, then variant fields
    pub fn to_bytes(&self) -> [u8; ASSET_RECORD_SIZE] {
        let mut out = [0u8; ASSET_RECORD_SIZE];
        out[..32].copy_from_slice(self.public_key().as_bytes());
        match self {
            Self::Empty => {}
            Self::Issuance {
                name,
                decimals,
                unit,
                ..
            } => {
                out[32] = TYPE_ISSUANCE;
                out[33..40].copy_from_slice(name.as_bytes());
                out[40] = decimals.to_le_bytes()[0];
                out[41..48].copy_from_slice(unit);
            }
            Self::Ownership {
                managing_contract,
                issuance_index,
                units,
                ..
            } => {
                out[32] = TYPE_OWNERSHIP;
                out[34..36].copy_from_slice(&managing_contract.to_le_bytes());
                out[36..40].copy_from_slice(&issuance_index.to_le_bytes());
                out[40..48].copy_from_slice(&units.to_le_bytes());
            }
            Self::Possession {
                managing_contract,
                ownership_index,
                units,
                ..
            } => {
                out[32] = TYPE_POSSESSION;
                out[34..36].copy_from_slice(&managing_contract.to_le_bytes());
                out[36..40].copy_from_slice(&ownership_index.to_le_bytes());
                out[40..48].copy_from_slice(&units.to_le_bytes());
            }
        }
        out
    }

    /// Decode the canonical encoding
    pub fn from_bytes(bytes: &[u8; ASSET_RECORD_SIZE]) -> Result<Self> {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let public_key = Id(key);
        let managing_contract = u16::from_le_bytes([bytes[34], bytes[35]]);
        let index = u32::from_le_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
        let mut units = [0u8; 8];
        units.copy_from_slice(&bytes[40..48]);
        let units = i64::from_le_bytes(units);
        Ok(match bytes[32] {
            TYPE_EMPTY => Self::Empty,
            TYPE_ISSUANCE => {
                let mut name = [0u8; 7];
                name.copy_from_slice(&bytes[33..40]);
                let mut unit = [0u8; 7];
                unit.copy_from_slice(&bytes[41..48]);
                Self::Issuance {
                    public_key,
                    name: AssetName::from_raw(name),
                    decimals: i8::from_le_bytes([bytes[40]]),
                    unit,
                }
            }
            TYPE_OWNERSHIP => Self::Ownership {
                public_key,
                managing_contract,
                issuance_index: index,
                units,
            },
            TYPE_POSSESSION => Self::Possession {
                public_key,
                managing_contract,
                ownership_index: index,
                units,
            },
            other => {
                return Err(LedgerError::decode(format!(
                    "unknown asset record type {other}"
                )))
            }
        })
    }
}

/// Slots created by a successful issuance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    /// Issuance slot
    pub issuance: usize,
    /// Issuer's ownership slot
    pub ownership: usize,
    /// Issuer's possession slot
    pub possession: usize,
    /// Shares issued
    pub units: i64,
}

/// Outcome of a successful share transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareTransfer {
    /// Destination ownership slot
    pub ownership: usize,
    /// Destination possession slot
    pub possession: usize,
    /// Issuance slot of the moved shares
    pub issuance: usize,
    /// Previous owner
    pub source_owner: Id,
    /// Previous possessor
    pub source_possessor: Id,
}

#[derive(Debug, Clone)]
struct IndexLists {
    issuances_first: u32,
    first: Vec<u32>,
    next: Vec<u32>,
}

impl IndexLists {
    fn new(capacity: usize) -> Self {
        Self {
            issuances_first: NO_ASSET_INDEX,
            first: vec![NO_ASSET_INDEX; capacity],
            next: vec![NO_ASSET_INDEX; capacity],
        }
    }

    fn add_issuance(&mut self, index: usize) {
        self.next[index] = self.issuances_first;
        self.issuances_first = index as u32;
    }

    fn add_child(&mut self, parent: usize, index: usize) {
        self.next[index] = self.first[parent];
        self.first[parent] = index as u32;
    }

    fn rebuild(&mut self, records: &[AssetRecord]) {
        *self = Self::new(records.len());
        for (index, record) in records.iter().enumerate() {
            match record {
                AssetRecord::Issuance { .. } => self.add_issuance(index),
                AssetRecord::Ownership { issuance_index, .. } => {
                    if (*issuance_index as usize) < records.len() {
                        self.add_child(*issuance_index as usize, index);
                    }
                }
                AssetRecord::Possession { ownership_index, .. } => {
                    if (*ownership_index as usize) < records.len() {
                        self.add_child(*ownership_index as usize, index);
                    }
                }
                AssetRecord::Empty => {}
            }
        }
    }

    fn walk(&self, mut cursor: u32) -> Vec<usize> {
        let mut out = Vec::new();
        while cursor != NO_ASSET_INDEX {
            out.push(cursor as usize);
            cursor = self.next[cursor as usize];
        }
        out
    }
}

/// Asset table with its digest tree and index lists
#[derive(Debug, Clone)]
pub struct Universe {
    records: Vec<AssetRecord>,
    digests: DigestTree,
    lists: IndexLists,
    occupied: usize,
}

struct Leaves<'a>(&'a [AssetRecord]);

impl LeafSource for Leaves<'_> {
    fn leaf_digest(&self, index: usize) -> Digest {
        hash(&self.0[index].to_bytes())
    }
}

impl Universe {
    /// Empty table of `2^depth` slots
    pub fn new(depth: u32) -> Result<Self> {
        let digests = DigestTree::new(depth)?;
        let capacity = digests.leaf_count();
        Ok(Self {
            records: vec![AssetRecord::Empty; capacity],
            digests,
            lists: IndexLists::new(capacity),
            occupied: 0,
        })
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Record in slot `index`
    pub fn record(&self, index: usize) -> &AssetRecord {
        &self.records[index]
    }

    /// All slots in index order
    pub fn records(&self) -> &[AssetRecord] {
        &self.records
    }

    fn next_slot(&self, index: usize) -> usize {
        (index + 1) & (self.capacity() - 1)
    }

    fn put(&mut self, index: usize, record: AssetRecord) {
        if self.records[index].is_empty() && !record.is_empty() {
            self.occupied += 1;
        }
        self.records[index] = record;
        self.digests.mark_dirty(index);
    }

    fn add_units(&mut self, index: usize, delta: i64) {
        match &mut self.records[index] {
            AssetRecord::Ownership { units, .. } | AssetRecord::Possession { units, .. } => {
                *units += delta;
            }
            AssetRecord::Empty | AssetRecord::Issuance { .. } => return,
        }
        self.digests.mark_dirty(index);
    }

    /// Slot of the issuance of `name` by `issuer`
    pub fn issuance_index(&self, issuer: &Id, name: &AssetName) -> Option<usize> {
        let mut index = issuer.slot(self.capacity());
        for _ in 0..self.capacity() {
            match &self.records[index] {
                AssetRecord::Empty => return None,
                AssetRecord::Issuance {
                    public_key,
                    name: existing,
                    ..
                } if public_key == issuer && existing == name => return Some(index),
                _ => {}
            }
            index = self.next_slot(index);
        }
        None
    }

    /// Slot of `owner`'s ownership of `issuance` under `managing_contract`
    pub fn ownership_index(&self, issuance: usize, owner: &Id, managing_contract: u16) -> Option<usize> {
        let mut index = owner.slot(self.capacity());
        for _ in 0..self.capacity() {
            match &self.records[index] {
                AssetRecord::Empty => return None,
                AssetRecord::Ownership {
                    public_key,
                    managing_contract: mc,
                    issuance_index,
                    ..
                } if public_key == owner
                    && *mc == managing_contract
                    && *issuance_index as usize == issuance =>
                {
                    return Some(index)
                }
                _ => {}
            }
            index = self.next_slot(index);
        }
        None
    }

    /// Slot of `possessor`'s possession of `ownership` under `managing_contract`
    pub fn possession_index(&self, ownership: usize, possessor: &Id, managing_contract: u16) -> Option<usize> {
        let mut index = possessor.slot(self.capacity());
        for _ in 0..self.capacity() {
            match &self.records[index] {
                AssetRecord::Empty => return None,
                AssetRecord::Possession {
                    public_key,
                    managing_contract: mc,
                    ownership_index,
                    ..
                } if public_key == possessor
                    && *mc == managing_contract
                    && *ownership_index as usize == ownership =>
                {
                    return Some(index)
                }
                _ => {}
            }
            index = self.next_slot(index);
        }
        None
    }

    /// Issue `units` shares of a new asset, all owned and possessed by `issuer`.
    ///
    /// Returns `None` if the issuer already issued an asset with this name,
    /// the name is malformed, the share count is out of range or the table
    /// cannot hold three more records.
    pub fn issue(
        &mut self,
        issuer: &Id,
        name: &AssetName,
        decimals: i8,
        unit: [u8; 7],
        units: i64,
        managing_contract: u16,
    ) -> Option<Issued> {
        if !name.is_valid() || units <= 0 || units > MAX_AMOUNT {
            return None;
        }
        if self.capacity() - self.occupied < 3 {
            tracing::warn!(issuer = %issuer, "Universe full, issuance rejected");
            return None;
        }

        let mut issuance = issuer.slot(self.capacity());
        loop {
            match &self.records[issuance] {
                AssetRecord::Empty => break,
                AssetRecord::Issuance {
                    public_key,
                    name: existing,
                    ..
                } if public_key == issuer && existing == name => return None,
                _ => issuance = self.next_slot(issuance),
            }
        }
        self.put(
            issuance,
            AssetRecord::Issuance {
                public_key: *issuer,
                name: *name,
                decimals,
                unit,
            },
        );

        let mut ownership = self.next_slot(issuance);
        while !self.records[ownership].is_empty() {
            ownership = self.next_slot(ownership);
        }
        self.put(
            ownership,
            AssetRecord::Ownership {
                public_key: *issuer,
                managing_contract,
                issuance_index: issuance as u32,
                units,
            },
        );

        let mut possession = self.next_slot(ownership);
        while !self.records[possession].is_empty() {
            possession = self.next_slot(possession);
        }
        self.put(
            possession,
            AssetRecord::Possession {
                public_key: *issuer,
                managing_contract,
                ownership_index: ownership as u32,
                units,
            },
        );

        self.lists.add_issuance(issuance);
        self.lists.add_child(issuance, ownership);
        self.lists.add_child(ownership, possession);

        Some(Issued {
            issuance,
            ownership,
            possession,
            units,
        })
    }

    /// Move `units` shares from a source ownership/possession pair to `destination`.
    ///
    /// Either every one of the four affected records is updated, or nothing
    /// changes and `None` is returned.
    pub fn transfer_ownership_and_possession(
        &mut self,
        source_ownership: usize,
        source_possession: usize,
        destination: &Id,
        units: i64,
    ) -> Option<ShareTransfer> {
        if units <= 0 || destination.is_zero() {
            return None;
        }
        if source_ownership >= self.capacity() || source_possession >= self.capacity() {
            return None;
        }
        let AssetRecord::Ownership {
            public_key: source_owner,
            managing_contract: ownership_mc,
            issuance_index,
            units: owned,
        } = self.records[source_ownership]
        else {
            return None;
        };
        let AssetRecord::Possession {
            public_key: source_possessor,
            managing_contract: possession_mc,
            ownership_index,
            units: possessed,
        } = self.records[source_possession]
        else {
            return None;
        };
        if owned < units || possessed < units || ownership_index as usize != source_ownership {
            return None;
        }

        let destination_ownership = self.find_slot(destination, None, |record| {
            matches!(record, AssetRecord::Ownership { public_key, managing_contract, issuance_index: i, .. }
                if public_key == destination && *managing_contract == ownership_mc && *i == issuance_index)
        })?;
        let reserved = self.records[destination_ownership]
            .is_empty()
            .then_some(destination_ownership);
        let destination_possession = self.find_slot(destination, reserved, |record| {
            matches!(record, AssetRecord::Possession { public_key, managing_contract, ownership_index: o, .. }
                if public_key == destination && *managing_contract == possession_mc && *o as usize == destination_ownership)
        })?;

        self.add_units(source_ownership, -units);
        if self.records[destination_ownership].is_empty() {
            self.put(
                destination_ownership,
                AssetRecord::Ownership {
                    public_key: *destination,
                    managing_contract: ownership_mc,
                    issuance_index,
                    units: 0,
                },
            );
            self.lists.add_child(issuance_index as usize, destination_ownership);
        }
        self.add_units(destination_ownership, units);

        self.add_units(source_possession, -units);
        if self.records[destination_possession].is_empty() {
            self.put(
                destination_possession,
                AssetRecord::Possession {
                    public_key: *destination,
                    managing_contract: possession_mc,
                    ownership_index: destination_ownership as u32,
                    units: 0,
                },
            );
            self.lists.add_child(destination_ownership, destination_possession);
        }
        self.add_units(destination_possession, units);

        Some(ShareTransfer {
            ownership: destination_ownership,
            possession: destination_possession,
            issuance: issuance_index as usize,
            source_owner,
            source_possessor,
        })
    }

    /// First slot from `key`'s home that is empty (and not `reserved`) or matches.
    fn find_slot(
        &self,
        key: &Id,
        reserved: Option<usize>,
        matches: impl Fn(&AssetRecord) -> bool,
    ) -> Option<usize> {
        let mut index = key.slot(self.capacity());
        for _ in 0..self.capacity() {
            let record = &self.records[index];
            if (record.is_empty() && reserved != Some(index)) || matches(record) {
                return Some(index);
            }
            index = self.next_slot(index);
        }
        None
    }

    /// Shares of `name` issued by `issuer`, owned by `owner` and possessed by `possessor`
    pub fn number_of_possessed_shares(
        &self,
        name: &AssetName,
        issuer: &Id,
        owner: &Id,
        possessor: &Id,
        ownership_managing_contract: u16,
        possession_managing_contract: u16,
    ) -> i64 {
        let Some(issuance) = self.issuance_index(issuer, name) else {
            return 0;
        };
        let Some(ownership) = self.ownership_index(issuance, owner, ownership_managing_contract) else {
            return 0;
        };
        let Some(possession) = self.possession_index(ownership, possessor, possession_managing_contract) else {
            return 0;
        };
        match self.records[possession] {
            AssetRecord::Possession { units, .. } => units,
            _ => 0,
        }
    }

    /// Slots of every issuance, most recent first
    pub fn issuances(&self) -> Vec<usize> {
        self.lists.walk(self.lists.issuances_first)
    }

    /// Slots of every ownership of `issuance`, or every possession of an ownership slot
    pub fn children(&self, parent: usize) -> Vec<usize> {
        self.lists.walk(self.lists.first[parent])
    }

    /// Total shares owned across every ownership of `issuance`
    pub fn number_of_shares(&self, issuance: usize) -> i64 {
        self.children(issuance)
            .into_iter()
            .map(|i| match self.records[i] {
                AssetRecord::Ownership { units, .. } => units,
                _ => 0,
            })
            .sum()
    }

    /// Rebuild the table from every possession with positive shares.
    ///
    /// Duplicate ownerships and possessions (same keys and contracts) are
    /// merged, records with no remaining shares are dropped and every leaf
    /// is flagged for rehashing.
    pub fn end_epoch(&mut self) {
        let capacity = self.capacity();
        let mask = capacity - 1;
        let mut compacted = vec![AssetRecord::Empty; capacity];

        for record in &self.records {
            let AssetRecord::Possession {
                public_key: possessor,
                managing_contract: possession_mc,
                ownership_index,
                units,
            } = *record
            else {
                continue;
            };
            if units <= 0 {
                continue;
            }
            let Some(AssetRecord::Ownership {
                public_key: owner,
                managing_contract: ownership_mc,
                issuance_index,
                ..
            }) = self.records.get(ownership_index as usize).copied()
            else {
                continue;
            };
            let Some(issuance_record @ AssetRecord::Issuance {
                public_key: issuer,
                name,
                ..
            }) = self.records.get(issuance_index as usize).copied()
            else {
                continue;
            };

            let mut issuance = issuer.slot(capacity);
            loop {
                match &compacted[issuance] {
                    AssetRecord::Empty => {
                        compacted[issuance] = issuance_record;
                        break;
                    }
                    AssetRecord::Issuance {
                        public_key,
                        name: existing,
                        ..
                    } if *public_key == issuer && *existing == name => break,
                    _ => issuance = (issuance + 1) & mask,
                }
            }

            let mut ownership = owner.slot(capacity);
            loop {
                match &mut compacted[ownership] {
                    slot @ AssetRecord::Empty => {
                        *slot = AssetRecord::Ownership {
                            public_key: owner,
                            managing_contract: ownership_mc,
                            issuance_index: issuance as u32,
                            units,
                        };
                        break;
                    }
                    AssetRecord::Ownership {
                        public_key,
                        managing_contract,
                        issuance_index,
                        units: owned,
                    } if *public_key == owner
                        && *managing_contract == ownership_mc
                        && *issuance_index as usize == issuance =>
                    {
                        *owned += units;
                        break;
                    }
                    _ => ownership = (ownership + 1) & mask,
                }
            }

            let mut possession = possessor.slot(capacity);
            loop {
                match &mut compacted[possession] {
                    slot @ AssetRecord::Empty => {
                        *slot = AssetRecord::Possession {
                            public_key: possessor,
                            managing_contract: possession_mc,
                            ownership_index: ownership as u32,
                            units,
                        };
                        break;
                    }
                    AssetRecord::Possession {
                        public_key,
                        managing_contract,
                        ownership_index,
                        units: possessed,
                    } if *public_key == possessor
                        && *managing_contract == possession_mc
                        && *ownership_index as usize == ownership =>
                    {
                        *possessed += units;
                        break;
                    }
                    _ => possession = (possession + 1) & mask,
                }
            }
        }

        self.records = compacted;
        self.occupied = self.records.iter().filter(|r| !r.is_empty()).count();
        self.lists.rebuild(&self.records);
        self.digests.mark_all_dirty();
        tracing::debug!(occupied = self.occupied, "Universe compacted");
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

    /// Concatenated canonical records
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.capacity() * ASSET_RECORD_SIZE);
        for record in &self.records {
            out.extend_from_slice(&record.to_bytes());
        }
        out
    }

    /// Decode a snapshot of `2^depth` records, rebuilding lists and digests.
    pub fn from_bytes(depth: u32, bytes: &[u8]) -> Result<Self> {
        let mut universe = Self::new(depth)?;
        if bytes.len() != universe.capacity() * ASSET_RECORD_SIZE {
            return Err(LedgerError::decode(format!(
                "universe snapshot has {} bytes, expected {}",
                bytes.len(),
                universe.capacity() * ASSET_RECORD_SIZE
            )));
        }
        for (slot, chunk) in bytes.chunks_exact(ASSET_RECORD_SIZE).enumerate() {
            let mut raw = [0u8; ASSET_RECORD_SIZE];
            raw.copy_from_slice(chunk);
            universe.records[slot] = AssetRecord::from_bytes(&raw)?;
        }
        universe.occupied = universe.records.iter().filter(|r| !r.is_empty()).count();
        universe.lists.rebuild(&universe.records);
        universe.digests.rebuild(&Leaves(&universe.records));
        Ok(universe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(low: u32, tag: u8) -> Id {
        let mut bytes = [tag; 32];
        bytes[..4].copy_from_slice(&low.to_le_bytes());
        Id(bytes)
    }

    fn qubic() -> AssetName {
        AssetName::new("QUBIC").unwrap()
    }

    #[test]
    fn test_asset_name_validation() {
        assert!(AssetName::new("QX").is_ok());
        assert!(AssetName::new("A1B2C3").is_ok());
        assert!(AssetName::new("").is_err());
        assert!(AssetName::new("TOOLONG").is_err());
        assert!(AssetName::new("1ABC").is_err());
        assert!(AssetName::new("AbC").is_err());
        assert_eq!(AssetName::from_u64(qubic().to_u64()), qubic());
        assert_eq!(qubic().to_string(), "QUBIC");
    }

    #[test]
    fn test_record_encoding() {
        let record = AssetRecord::Ownership {
            public_key: key(1, 2),
            managing_contract: 3,
            issuance_index: 9,
            units: 700,
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes[32], TYPE_OWNERSHIP);
        assert_eq!(AssetRecord::from_bytes(&bytes).unwrap(), record);
        assert_eq!(AssetRecord::Empty.to_bytes(), [0u8; ASSET_RECORD_SIZE]);

        let mut bad = bytes;
        bad[32] = 9;
        assert!(AssetRecord::from_bytes(&bad).is_err());
    }

    #[test]
    fn test_issue_creates_chained_triple() {
        let mut universe = Universe::new(5).unwrap();
        let issuer = key(4, 1);
        let issued = universe.issue(&issuer, &qubic(), 0, [0; 7], 1000, 1).unwrap();
        assert_eq!(issued.issuance, 4);
        assert_eq!(issued.ownership, 5);
        assert_eq!(issued.possession, 6);
        assert_eq!(universe.issuance_index(&issuer, &qubic()), Some(4));
        assert_eq!(universe.number_of_shares(4), 1000);
        assert_eq!(universe.issue(&issuer, &qubic(), 0, [0; 7], 5, 1), None);
        assert_eq!(universe.occupied(), 3);
    }

    #[test]
    fn test_issue_rejects_bad_input() {
        let mut universe = Universe::new(5).unwrap();
        let issuer = key(4, 1);
        assert_eq!(universe.issue(&issuer, &qubic(), 0, [0; 7], 0, 1), None);
        assert_eq!(universe.issue(&issuer, &qubic(), 0, [0; 7], MAX_AMOUNT + 1, 1), None);
        let bad = AssetName::from_raw(*b"qubic\0\0");
        assert_eq!(universe.issue(&issuer, &bad, 0, [0; 7], 1, 1), None);
    }

    #[test]
    fn test_transfer_moves_shares() {
        let mut universe = Universe::new(5).unwrap();
        let a = key(4, 1);
        let b = key(20, 2);
        let issued = universe.issue(&a, &qubic(), 0, [0; 7], 1000, 1).unwrap();
        let moved = universe
            .transfer_ownership_and_possession(issued.ownership, issued.possession, &b, 300)
            .unwrap();
        assert_eq!(moved.source_owner, a);
        assert_eq!(universe.number_of_possessed_shares(&qubic(), &a, &a, &a, 1, 1), 700);
        assert_eq!(universe.number_of_possessed_shares(&qubic(), &a, &b, &b, 1, 1), 300);
        assert_eq!(universe.number_of_shares(issued.issuance), 1000);
        assert_eq!(universe.children(issued.issuance).len(), 2);
    }

    #[test]
    fn test_transfer_reserves_new_ownership_slot() {
        let mut universe = Universe::new(5).unwrap();
        let a = key(4, 1);
        let b = key(20, 2);
        let issued = universe.issue(&a, &qubic(), 0, [0; 7], 10, 1).unwrap();
        let moved = universe
            .transfer_ownership_and_possession(issued.ownership, issued.possession, &b, 1)
            .unwrap();
        assert_eq!(moved.ownership, 20);
        assert_eq!(moved.possession, 21);
    }

    #[test]
    fn test_failed_transfer_changes_nothing() {
        let mut universe = Universe::new(5).unwrap();
        let a = key(4, 1);
        let b = key(20, 2);
        let issued = universe.issue(&a, &qubic(), 0, [0; 7], 10, 1).unwrap();
        let before = universe.to_bytes();
        for _ in 0..2 {
            assert!(universe
                .transfer_ownership_and_possession(issued.ownership, issued.possession, &b, 11)
                .is_none());
            assert!(universe
                .transfer_ownership_and_possession(issued.ownership, issued.possession, &Id::ZERO, 1)
                .is_none());
            assert!(universe
                .transfer_ownership_and_possession(issued.ownership, issued.ownership, &b, 1)
                .is_none());
            assert_eq!(universe.to_bytes(), before);
        }
    }

    #[test]
    fn test_end_epoch_merges_and_drops_empty() {
        let mut universe = Universe::new(5).unwrap();
        let a = key(4, 1);
        let b = key(20, 2);
        let issued = universe.issue(&a, &qubic(), 0, [0; 7], 10, 1).unwrap();
        let moved = universe
            .transfer_ownership_and_possession(issued.ownership, issued.possession, &b, 10)
            .unwrap();
        assert!(moved.ownership != issued.ownership);
        universe.end_epoch();

        assert_eq!(universe.occupied(), 3);
        assert_eq!(universe.number_of_possessed_shares(&qubic(), &a, &b, &b, 1, 1), 10);
        assert_eq!(universe.number_of_possessed_shares(&qubic(), &a, &a, &a, 1, 1), 0);
        let issuance = universe.issuance_index(&a, &qubic()).unwrap();
        assert_eq!(universe.number_of_shares(issuance), 10);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut universe = Universe::new(5).unwrap();
        universe.issue(&key(4, 1), &qubic(), 2, *b"KG\0\0\0\0\0", 10, 1).unwrap();
        let root = universe.recompute_digest();
        let restored = Universe::from_bytes(5, &universe.to_bytes()).unwrap();
        assert_eq!(restored.digest(), root);
        assert_eq!(restored.issuances(), universe.issuances());
    }
}
