// libs/session-cell/src/services/snapshot.rs
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::models::{Identity, SnapshotError};

/// Durable last-known-good identity, keyed by session. Reads are synchronous
/// so a restored identity is available before any network round trip.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, session_key: &str) -> Result<Option<Identity>, SnapshotError>;
    fn save(&self, session_key: &str, identity: &Identity) -> Result<(), SnapshotError>;
    fn clear(&self, session_key: &str) -> Result<(), SnapshotError>;
}

/// One JSON file per session under a cache directory.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Session keys come from token claims; hash them so they never form a path.
    fn path_for(&self, session_key: &str) -> PathBuf {
        let digest = Sha256::digest(session_key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    /// Delete snapshots not written for at least `max_age`. Returns how many
    /// were removed. A missing directory has nothing to prune.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize, SnapshotError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let modified = fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age >= max_age {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        debug!("Pruned {} identity snapshots from {}", removed, self.dir.display());
        Ok(removed)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, session_key: &str) -> Result<Option<Identity>, SnapshotError> {
        let path = self.path_for(session_key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let identity = serde_json::from_str(&raw)?;
        debug!("Loaded identity snapshot from {}", path.display());
        Ok(Some(identity))
    }

    fn save(&self, session_key: &str, identity: &Identity) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        // Each write gets its own temporary file, so concurrent saves for the
        // same key never rename each other's file away.
        let path = self.path_for(session_key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec(identity)?)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!("Saved identity snapshot to {}", path.display());
        Ok(())
    }

    fn clear(&self, session_key: &str) -> Result<(), SnapshotError> {
        match fs::remove_file(self.path_for(session_key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local snapshot store, for tests and single-process deployments
/// that do not need restart survival.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under a key, bypassing serialization.
    pub fn insert_raw(&self, session_key: &str, raw: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_key.to_string(), raw.to_string());
    }

    pub fn contains(&self, session_key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_key)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, session_key: &str) -> Result<Option<Identity>, SnapshotError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(session_key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session_key: &str, identity: &Identity) -> Result<(), SnapshotError> {
        let raw = serde_json::to_string(identity)?;
        self.insert_raw(session_key, &raw);
        Ok(())
    }

    fn clear(&self, session_key: &str) -> Result<(), SnapshotError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_key);
        Ok(())
    }
}
