//! Checkpoint persistence.
//!
//! The checkpoint is a single JSON file holding the full `MigrationState`,
//! written with a write-new-then-rename pattern so a crash mid-write can
//! never corrupt the previous checkpoint. A missing or corrupt file is never
//! fatal: it loads as a zero-valued state and the corruption is logged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::EngineError;
use crate::model::MigrationState;

/// Loads and saves `MigrationState` at a fixed path. The store never mutates
/// counters; it only serializes and deserializes what the scheduler owns.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the persisted state. Returns a zero-valued state when no
    /// checkpoint exists or the file cannot be parsed; corruption is logged
    /// as a warning, not an error.
    pub fn load(&self) -> MigrationState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return MigrationState::new();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "checkpoint unreadable; starting from a fresh state"
                );
                return MigrationState::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "checkpoint corrupt; starting from a fresh state"
                );
                MigrationState::new()
            }
        }
    }

    /// Persist the full state. Writes a sibling temp file and renames it over
    /// the checkpoint, so the previous checkpoint survives a crash mid-write.
    ///
    /// A save failure is returned to the caller; the scheduler logs it and
    /// retries on the next batch boundary.
    pub fn save(&self, state: &MigrationState) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EngineError::CheckpointSaveFailed {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        let json = serde_json::to_vec_pretty(state).map_err(|e| {
            EngineError::CheckpointSaveFailed {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            }
        })?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &json).map_err(|e| EngineError::CheckpointSaveFailed {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| EngineError::CheckpointSaveFailed {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        self.path.with_file_name(format!("{}.tmp", file_name))
    }
}
