//! 32-byte entity identities
//!
//! An `Id` is the public key of an entity (user, computor or contract). The
//! zero id never owns anything: it marks empty table slots, the burn
//! destination and the issuer of contract shares.
//!
//! Contract ids are synthetic: the contract index lives in the first eight
//! bytes (little-endian) and the remaining bytes are zero.

use crate::errors::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Public key of a ledger entity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Id(pub [u8; 32]);

impl Id {
    /// The zero id
    pub const ZERO: Id = Id([0u8; 32]);

    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Whether this is the zero id
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Home slot of this key in an open-addressing table of `capacity` slots.
    ///
    /// `capacity` must be a power of two.
    pub fn slot(&self, capacity: usize) -> usize {
        let low = u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        (low as usize) & (capacity - 1)
    }

    /// Id of the contract at `index`
    pub fn from_contract_index(index: usize) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&(index as u64).to_le_bytes());
        Self(bytes)
    }

    /// Contract index encoded in this id, if it has the contract id shape.
    ///
    /// Returns `None` for the zero id and for ordinary keys.
    pub fn contract_index(&self) -> Option<usize> {
        if self.0[8..].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        match u64::from_le_bytes(low) {
            0 => None,
            index => usize::try_from(index).ok(),
        }
    }

    /// Hex encoding of the key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for Id {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}..)", &self.to_hex()[..12])
    }
}

impl FromStr for Id {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| LedgerError::invalid(format!("bad id hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::invalid("id must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}
