//! Configuration loading shared by every ledger configuration type
//!
//! Configurations are plain serde structs. The trait supplies TOML file
//! loading and environment overrides generically: a variable named
//! `QUORUM_<SECTION>_<FIELD>` overrides `field` in table `section`, parsed
//! according to the type the field already has.

use crate::errors::{LedgerError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "QUORUM_";

/// Core trait for ledger configuration types
pub trait LedgerConfig: Clone + Default + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Default configuration values
    fn defaults() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text. Missing fields take defaults.
    fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `QUORUM_*` overrides from the process environment
    fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `QUORUM_*` overrides from an explicit variable list
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let rest = rest.to_lowercase();
                let Some((section, field)) = rest.split_once('_') else {
                    continue;
                };
                self.set_from_string(&format!("{section}.{field}"), &value)?;
            }
        }
        Ok(())
    }

    /// Set `section.field` from its string form
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        let mut tree = toml::Value::try_from(&*self)?;
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| LedgerError::config(format!("key {key} must be section.field")))?;
        let slot = tree
            .get_mut(section)
            .and_then(|s| s.get_mut(field))
            .ok_or_else(|| LedgerError::config(format!("unknown config key {key}")))?;
        *slot = parse_like(slot, value)
            .ok_or_else(|| LedgerError::config(format!("bad value {value:?} for {key}")))?;
        *self = tree.try_into()?;
        Ok(())
    }

    /// Check cross-field consistency
    fn validate(&self) -> Result<()>;
}

fn parse_like(current: &toml::Value, raw: &str) -> Option<toml::Value> {
    Some(match current {
        toml::Value::Integer(_) => toml::Value::Integer(raw.parse().ok()?),
        toml::Value::Boolean(_) => toml::Value::Boolean(raw.parse().ok()?),
        toml::Value::Float(_) => toml::Value::Float(raw.parse().ok()?),
        toml::Value::String(_) => toml::Value::String(raw.to_string()),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        consensus: SampleSection,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct SampleSection {
        computors: u64,
        poll_period_ms: u64,
        label: String,
    }

    impl Default for SampleSection {
        fn default() -> Self {
            Self {
                computors: 676,
                poll_period_ms: 1000,
                label: "main".to_string(),
            }
        }
    }

    impl LedgerConfig for Sample {
        fn validate(&self) -> Result<()> {
            if self.consensus.computors == 0 {
                return Err(LedgerError::config("computors must be positive"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Sample::from_toml_str("[consensus]\ncomputors = 6\n").unwrap();
        assert_eq!(config.consensus.computors, 6);
        assert_eq!(config.consensus.poll_period_ms, 1000);
    }

    #[test]
    fn test_env_overrides_nested_field() {
        let mut config = Sample::defaults();
        config
            .merge_with_vars(vec![
                ("QUORUM_CONSENSUS_POLL_PERIOD_MS".to_string(), "250".to_string()),
                ("QUORUM_CONSENSUS_LABEL".to_string(), "test".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.consensus.poll_period_ms, 250);
        assert_eq!(config.consensus.label, "test");
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = Sample::defaults();
        assert!(config.set_from_string("consensus.computors", "many").is_err());
        assert!(config.set_from_string("consensus.missing", "1").is_err());
        assert!(config.set_from_string("computors", "1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[consensus]\ncomputors = 0\n").unwrap();
        let config = Sample::load_from_file(&path).unwrap();
        assert!(config.validate().is_err());
    }
}
