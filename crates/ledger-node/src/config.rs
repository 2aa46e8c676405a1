//! Node configuration
//!
//! One TOML file with a table per layer:
//!
//! ```toml
//! [ledger]
//! spectrum_depth = 16
//!
//! [consensus]
//! computors = 676
//!
//! [runtime]
//! execution_stacks = 4
//!
//! [node]
//! hosted_computors = [0, 1]
//! snapshot_dir = "snapshots"
//! ```
//!
//! Every scalar can be overridden from the environment as
//! `QUORUM_<SECTION>_<FIELD>`, e.g. `QUORUM_CONSENSUS_COMPUTORS=4`.

use ledger_consensus::{ConsensusConfig, WireDimensions};
use ledger_contracts::RuntimeConfig;
use ledger_core::{Id, LedgerConfig, LedgerError, Result, SigningIdentity};
use ledger_state::TableConfig;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Settings of the node process itself (`[node]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Contract function calls served concurrently
    pub request_workers: usize,
    /// Directory for epoch snapshots; empty disables snapshots
    pub snapshot_dir: String,
    /// Seed every computor identity is derived from when no explicit seeds
    /// are given
    pub devnet_seed: u64,
    /// Hex identity seeds of every computor, in index order
    pub identity_seeds: Vec<String>,
    /// Computor indexes this node signs for
    pub hosted_computors: Vec<usize>,
    /// Epoch to start or resume; 0 takes the epoch of the genesis time
    pub epoch: u16,
    /// First tick of `epoch` when starting without a snapshot
    pub initial_tick: u32,
    /// Genesis time shared by every node, in Unix milliseconds; 0 takes
    /// the local clock at startup
    pub genesis_unix_millis: u64,
    /// Epoch the built-in contracts are constructed in
    pub contract_construction_epoch: u16,
    /// Contract index slots, including the unused index 0
    pub contract_slots: usize,
    /// Balances credited when starting without a snapshot
    pub genesis_accounts: Vec<GenesisAccount>,
}

/// An account funded at genesis (`[[node.genesis_accounts]]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Hex entity id
    pub id: String,
    /// Energy credited
    pub amount: i64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            request_workers: 4,
            snapshot_dir: String::new(),
            devnet_seed: 0,
            identity_seeds: Vec::new(),
            hosted_computors: Vec::new(),
            epoch: 0,
            initial_tick: 0,
            genesis_unix_millis: 0,
            contract_construction_epoch: 1,
            contract_slots: 16,
            genesis_accounts: Vec::new(),
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Table sizes
    pub ledger: TableConfig,
    /// Tick agreement parameters
    pub consensus: ConsensusConfig,
    /// Contract runtime sizing
    pub runtime: RuntimeConfig,
    /// Process settings
    pub node: NodeSection,
}

/// Computor keys and the identities hosted by this node
#[derive(Debug)]
pub struct Roster {
    /// Every computor's key in index order
    pub keys: Vec<Id>,
    /// Identities this node signs with
    pub hosted: Vec<(usize, SigningIdentity)>,
}

impl NodeConfig {
    /// Small network of `computors` for local runs, hosting `hosted`
    pub fn devnet(computors: usize, hosted: Vec<usize>) -> Self {
        let mut config = Self::default();
        config.consensus.computors = computors;
        config.consensus.transactions_per_tick = 16;
        config.consensus.poll_period_ms = 50;
        config.consensus.target_tick_duration_ms = 200;
        config.node.hosted_computors = hosted;
        config
    }

    /// Identity seeds of every computor in index order
    pub fn computor_seeds(&self) -> Result<Vec<[u8; 32]>> {
        if !self.node.identity_seeds.is_empty() {
            return self
                .node
                .identity_seeds
                .iter()
                .map(|seed| {
                    let bytes = hex::decode(seed)
                        .map_err(|e| LedgerError::config(format!("identity seed is not hex: {e}")))?;
                    bytes
                        .try_into()
                        .map_err(|_| LedgerError::config("identity seed must be 32 bytes"))
                })
                .collect();
        }
        let mut rng = ChaCha20Rng::seed_from_u64(self.node.devnet_seed);
        Ok((0..self.consensus.computors)
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect())
    }

    /// Derive every computor key and the identities of hosted computors
    pub fn roster(&self) -> Result<Roster> {
        let seeds = self.computor_seeds()?;
        let keys = seeds
            .iter()
            .map(|seed| SigningIdentity::from_seed(*seed).id())
            .collect();
        let hosted = self
            .node
            .hosted_computors
            .iter()
            .map(|index| {
                let seed = seeds
                    .get(*index)
                    .ok_or_else(|| LedgerError::config(format!("hosted computor {index} has no seed")))?;
                Ok((*index, SigningIdentity::from_seed(*seed)))
            })
            .collect::<Result<_>>()?;
        Ok(Roster { keys, hosted })
    }

    /// Parsed genesis balances
    pub fn genesis_balances(&self) -> Result<Vec<(Id, i64)>> {
        self.node
            .genesis_accounts
            .iter()
            .map(|account| {
                let id = account
                    .id
                    .parse::<Id>()
                    .map_err(|_| LedgerError::config(format!("genesis account {} is not an id", account.id)))?;
                if account.amount <= 0 || id.is_zero() {
                    return Err(LedgerError::config(format!("genesis account {} is not fundable", account.id)));
                }
                Ok((id, account.amount))
            })
            .collect()
    }

    /// Message sizes every node of this network must share
    pub fn wire_dimensions(&self) -> WireDimensions {
        WireDimensions {
            computors: self.consensus.computors,
            transactions_per_tick: self.consensus.transactions_per_tick,
            contracts: self.node.contract_slots,
        }
    }

    /// Snapshot directory, if snapshots are enabled
    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        (!self.node.snapshot_dir.is_empty()).then(|| PathBuf::from(&self.node.snapshot_dir))
    }
}

impl LedgerConfig for NodeConfig {
    fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.consensus.validate()?;
        self.runtime.validate()?;

        let node = &self.node;
        if node.request_workers == 0 {
            return Err(LedgerError::config("request_workers must be positive"));
        }
        if node.contract_slots < 2 {
            return Err(LedgerError::config("contract_slots must leave room for a contract"));
        }
        if !node.identity_seeds.is_empty() && node.identity_seeds.len() != self.consensus.computors {
            return Err(LedgerError::config(format!(
                "{} identity seeds for {} computors",
                node.identity_seeds.len(),
                self.consensus.computors
            )));
        }
        self.genesis_balances()?;
        let mut seen = BTreeSet::new();
        for index in &node.hosted_computors {
            if *index >= self.consensus.computors || !seen.insert(*index) {
                return Err(LedgerError::config(format!("bad hosted computor {index}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(NodeConfig::default().validate().is_ok());
        assert!(NodeConfig::devnet(4, vec![0, 1, 2, 3]).validate().is_ok());
    }

    #[test]
    fn test_sections_parse_from_toml() {
        let text = r#"
            [consensus]
            computors = 7
            revenue_model = "three_factor"

            [node]
            hosted_computors = [1, 3]
            snapshot_dir = "snaps"
        "#;
        let config = NodeConfig::from_toml_str(text).unwrap();
        assert_eq!(config.consensus.computors, 7);
        assert_eq!(config.consensus.quorum(), 5);
        assert_eq!(config.node.hosted_computors, vec![1, 3]);
        assert_eq!(config.snapshot_dir(), Some(PathBuf::from("snaps")));
        assert_eq!(config.ledger, TableConfig::default());
    }

    #[test]
    fn test_env_overrides_reach_every_section() {
        let mut config = NodeConfig::default();
        config
            .merge_with_vars(vec![
                ("QUORUM_CONSENSUS_COMPUTORS".to_string(), "4".to_string()),
                ("QUORUM_NODE_REQUEST_WORKERS".to_string(), "2".to_string()),
                ("QUORUM_LEDGER_SPECTRUM_DEPTH".to_string(), "10".to_string()),
            ])
            .unwrap();
        assert_eq!(config.consensus.computors, 4);
        assert_eq!(config.node.request_workers, 2);
        assert_eq!(config.ledger.spectrum_depth, 10);
    }

    #[test]
    fn test_hosted_computors_checked() {
        let mut config = NodeConfig::devnet(4, vec![0, 4]);
        assert!(config.validate().is_err());
        config.node.hosted_computors = vec![1, 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roster_is_deterministic() {
        let config = NodeConfig::devnet(4, vec![2]);
        let roster = config.roster().unwrap();
        assert_eq!(roster.keys.len(), 4);
        assert_eq!(roster.hosted[0].1.id(), roster.keys[2]);
        assert_eq!(config.roster().unwrap().keys, roster.keys);

        let mut other = config.clone();
        other.node.devnet_seed = 1;
        assert_ne!(other.roster().unwrap().keys, roster.keys);
    }

    #[test]
    fn test_genesis_accounts_parse() {
        let text = format!(
            r#"
            [[node.genesis_accounts]]
            id = "{}"
            amount = 1000
        "#,
            Id([7; 32])
        );
        let mut config = NodeConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.genesis_balances().unwrap(), vec![(Id([7; 32]), 1000)]);

        config.node.genesis_accounts[0].amount = 0;
        assert!(config.validate().is_err());
        config.node.genesis_accounts[0].id = "not an id".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_seeds_replace_derivation() {
        let mut config = NodeConfig::devnet(2, vec![0]);
        config.node.identity_seeds = vec![hex::encode([1u8; 32]), hex::encode([2u8; 32])];
        let roster = config.roster().unwrap();
        assert_eq!(roster.keys[1], SigningIdentity::from_seed([2; 32]).id());

        config.node.identity_seeds.pop();
        assert!(config.validate().is_err());
    }
}
