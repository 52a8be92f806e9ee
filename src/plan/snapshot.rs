//! Serializable plan snapshots and where they are kept.
//!
//! A snapshot captures everything needed to restore a plan exactly: the
//! roster, the slot table, the selected pack and the applied pathway. Stores
//! only move bytes around; invariants are checked when the snapshot is turned
//! back into a live plan.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::state::PlanState;
use crate::catalog::SessionPack;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors raised by snapshot stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub version: u32,
    pub saved_at: Timestamp,
    #[serde(default)]
    pub pathway: Option<String>,
    pub pack: SessionPack,
    pub capacity: u16,
    pub state: PlanState,
}

impl PlanSnapshot {
    pub fn new(state: PlanState, pack: SessionPack, pathway: Option<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Timestamp::now(),
            pathway,
            pack,
            capacity: state.capacity(),
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting versions this build cannot read.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

/// Somewhere a plan snapshot can be saved and loaded.
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<PlanSnapshot>, StoreError>;

    fn save(&self, snapshot: &PlanSnapshot) -> Result<(), StoreError>;
}

/// JSON file on disk.
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write never leaves a truncated snapshot behind.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<PlanSnapshot>, StoreError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "no snapshot file yet");
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        PlanSnapshot::from_json(&content).map(Some)
    }

    fn save(&self, snapshot: &PlanSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, snapshot.to_json()?)?;
        std::fs::rename(&temp, &self.path)?;
        debug!(path = ?self.path, "saved snapshot");
        Ok(())
    }
}

/// In-process store, used by tests and when no snapshot path is configured.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: RwLock<Option<PlanSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<PlanSnapshot>, StoreError> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &PlanSnapshot) -> Result<(), StoreError> {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TopicKey};

    fn sample() -> PlanSnapshot {
        let catalog = Catalog::builtin();
        let topic = catalog
            .topic(&TopicKey::new("portfolio-film").unwrap())
            .unwrap();
        let state = PlanState::empty(5).add(topic).unwrap().state;
        PlanSnapshot::new(
            state,
            catalog.session_pack(5).unwrap(),
            Some("Film Portfolio".into()),
        )
    }

    #[test]
    fn test_file_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("plan.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested").join("plan.json"));
        let snapshot = sample();
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = sample();
        snapshot.version = 99;
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(
            PlanSnapshot::from_json(&json),
            Err(StoreError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileSnapshotStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().capacity, 5);
    }
}
