//! Snapshot persistence for crash and reload recovery.
//!
//! The store keeps exactly one record: the [`Snapshot`] of the session that is
//! currently active, if any. It is deliberately independent of the state
//! machine's in-memory shape.
//!
//! # Design
//!
//! - **Never fails on read**: [`SnapshotStore::load`] returns `None` when the
//!   storage is empty, unreadable, corrupt, or holds a snapshot whose
//!   `version` is not [`SNAPSHOT_VERSION`]. The condition is logged, not
//!   surfaced.
//! - **Atomic writes**: [`FileSnapshotStore`] writes to a sibling temp file and
//!   renames it over the target so a crash mid-write leaves the previous
//!   snapshot intact.
//! - **Single logical resource**: nothing here locks the file. Only the tab
//!   holding leadership is expected to write it.
//!
//! # Example
//!
//! ```no_run
//! use focus_core::persistence::{FileSnapshotStore, SnapshotStore};
//! use focus_core::types::{Snapshot, SnapshotStatus};
//!
//! let store = FileSnapshotStore::new("/tmp/focus/active-session.json");
//! let snapshot = Snapshot::new("t1", None, 1_700_000_000_000, 0, 1_500_000, SnapshotStatus::Running);
//! store.save(&snapshot).unwrap();
//! assert_eq!(store.load(), Some(snapshot));
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result as FocusResult;
use crate::types::{Snapshot, SNAPSHOT_VERSION};

/// Errors that can occur while writing or clearing a snapshot.
#[derive(Error, Debug)]
pub enum StorageError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage for the active-session snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Writes `snapshot`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the snapshot cannot be serialized or written.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    /// Reads the stored snapshot. Never fails: anything unusable is `None`.
    fn load(&self) -> Option<Snapshot>;

    /// Removes the stored snapshot. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the underlying storage cannot be modified.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Decodes raw snapshot JSON, rejecting anything that is not a well-formed
/// snapshot of the current version.
fn decode(raw: &str) -> Option<Snapshot> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Discarding unreadable snapshot");
            return None;
        }
    };

    let version = value.get("version").and_then(Value::as_u64);
    if version != Some(u64::from(SNAPSHOT_VERSION)) {
        warn!(?version, "Discarding snapshot with unsupported version");
        return None;
    }

    match serde_json::from_value(value) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "Discarding malformed snapshot");
            None
        }
    }
}

/// Snapshot store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens the store at the configured snapshot path, creating the state
    /// directory so that an unusable location is reported up front.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Storage` if the state directory cannot be created.
    pub fn open(config: &Config) -> FocusResult<Self> {
        fs::create_dir_all(&config.state_dir).map_err(StorageError::from)?;
        debug!(state_dir = %config.state_dir.display(), "Snapshot store opened");
        Ok(Self::new(config.snapshot_path()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), session_id = %snapshot.session_id, "Snapshot saved");
        Ok(())
    }

    fn load(&self) -> Option<Snapshot> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read snapshot");
                None
            }
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Snapshot cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Snapshot store held in memory. Stores the serialized form so that reads go
/// through the same decoding path as the file store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    raw: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored bytes verbatim.
    pub fn put_raw(&self, raw: impl Into<String>) {
        if let Ok(mut guard) = self.raw.lock() {
            *guard = Some(raw.into());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let json = serde_json::to_string(snapshot)?;
        self.put_raw(json);
        Ok(())
    }

    fn load(&self) -> Option<Snapshot> {
        let guard = self.raw.lock().ok()?;
        guard.as_deref().and_then(decode)
    }

    fn clear(&self) -> Result<(), StorageError> {
        if let Ok(mut guard) = self.raw.lock() {
            *guard = None;
        }
        Ok(())
    }
}
