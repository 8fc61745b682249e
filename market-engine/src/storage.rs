use std::{
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_types::{Listing, ListingId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub listings: Vec<Listing>,
    pub next_listing_id: ListingId,
}

/// Injected persistence seam. The engine assumes nothing about the backing
/// medium beyond load-at-bootstrap and persist-after-mutation.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<CatalogSnapshot>, StorageError>;
    fn persist(&self, snapshot: &CatalogSnapshot) -> Result<(), StorageError>;
}

/// Catalog snapshot backed by a simple json file.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<Option<CatalogSnapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn persist(&self, snapshot: &CatalogSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

/// Keeps the last persisted snapshot in memory; default for tests.
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<CatalogSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<CatalogSnapshot>, StorageError> {
        Ok(self.snapshot.lock().clone())
    }

    fn persist(&self, snapshot: &CatalogSnapshot) -> Result<(), StorageError> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}
