//! Snapshot persistence
//!
//! Snapshots are opaque named byte blobs. Each partition owns its encoding;
//! the store only moves bytes.

use crate::errors::{LedgerError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistent storage for named snapshots
pub trait SnapshotStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous snapshot
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Load the snapshot stored under `name`
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Snapshot name with the epoch as a three-digit suffix, e.g. `spectrum.083`
pub fn epoch_snapshot_name(base: &str, epoch: u16) -> String {
    format!("{base}.{epoch:03}")
}

/// Stores each snapshot as a file in one directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(LedgerError::invalid(format!("bad snapshot name {name:?}")));
        }
        Ok(self.dir.join(name))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        let staging = self.dir.join(format!(".{name}.partial"));
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &path)?;
        tracing::debug!(name, size = bytes.len(), "Snapshot persisted");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        Ok(std::fs::read(path)?)
    }
}

/// Keeps snapshots in memory
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored snapshot
    pub fn names(&self) -> Vec<String> {
        self.blobs.lock().keys().cloned().collect()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| LedgerError::missing_snapshot(format!("snapshot {name}")))
    }
}
