//! Table sizing

use ledger_core::params::{ASSETS_DEPTH, SPECTRUM_DEPTH};
use ledger_core::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Depths of the balance and asset tables (`2^depth` slots each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Depth of the spectrum
    pub spectrum_depth: u32,
    /// Depth of the universe
    pub asset_depth: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            spectrum_depth: 16,
            asset_depth: 16,
        }
    }
}

impl TableConfig {
    /// Full-size production tables
    pub fn production() -> Self {
        Self {
            spectrum_depth: SPECTRUM_DEPTH,
            asset_depth: ASSETS_DEPTH,
        }
    }

    /// Check both depths are within `2..=24`
    pub fn validate(&self) -> Result<()> {
        for (name, depth) in [
            ("spectrum_depth", self.spectrum_depth),
            ("asset_depth", self.asset_depth),
        ] {
            if !(2..=SPECTRUM_DEPTH.max(ASSETS_DEPTH)).contains(&depth) {
                return Err(LedgerError::config(format!(
                    "{name} must be between 2 and 24, got {depth}"
                )));
            }
        }
        Ok(())
    }
}
