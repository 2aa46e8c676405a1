//! Unified error type for ledger infrastructure
//!
//! Ledger operations themselves report failure through sentinel return values
//! (see `ledger-state`). This error type covers everything around them:
//! configuration, snapshot I/O, decoding of wire records and key material.

use serde::{Deserialize, Serialize};

/// Error type for infrastructure operations across the ledger crates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum LedgerError {
    /// A value is outside what the ledger accepts
    #[error("Invalid: {message}")]
    Invalid {
        /// What was rejected
        message: String,
    },

    /// No snapshot was saved under the requested name
    #[error("Missing snapshot: {message}")]
    MissingSnapshot {
        /// Snapshot name or path
        message: String,
    },

    /// Seed or key bytes are unusable
    #[error("Key material error: {message}")]
    KeyMaterial {
        /// What was wrong with the key
        message: String,
    },

    /// A record, snapshot or message could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Which encoding failed and why
        message: String,
    },

    /// Reading or writing a snapshot failed
    #[error("Snapshot I/O error: {message}")]
    SnapshotIo {
        /// Underlying I/O failure
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {message}")]
    Config {
        /// The offending setting
        message: String,
    },
}

impl LedgerError {
    /// Create an invalid value error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a missing snapshot error
    pub fn missing_snapshot(message: impl Into<String>) -> Self {
        Self::MissingSnapshot {
            message: message.into(),
        }
    }

    /// Create a key material error
    pub fn key_material(message: impl Into<String>) -> Self {
        Self::KeyMaterial {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a snapshot I/O error
    pub fn snapshot_io(message: impl Into<String>) -> Self {
        Self::SnapshotIo {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Standard Result type for ledger infrastructure
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::missing_snapshot(err.to_string()),
            _ => Self::snapshot_io(err.to_string()),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for LedgerError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_message() {
        let err = LedgerError::decode("spectrum snapshot is 3 bytes");
        assert_eq!(err.to_string(), "Decode error: spectrum snapshot is 3 bytes");
    }

    #[test]
    fn test_io_errors_map_to_snapshot_errors() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "spectrum.083");
        assert!(matches!(LedgerError::from(missing), LedgerError::MissingSnapshot { .. }));

        let full = std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full");
        assert!(matches!(LedgerError::from(full), LedgerError::SnapshotIo { .. }));
    }

    #[test]
    fn test_config_error_from_toml() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err = LedgerError::from(parse.unwrap_err());
        assert!(matches!(err, LedgerError::Config { .. }));
    }
}
