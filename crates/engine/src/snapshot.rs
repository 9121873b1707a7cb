//! Registry snapshots: versioned JSON save/load

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_errors::{Error, StorageError};
use stagehand_types::Operation;
use tokio::fs;

use crate::advance::consistency_violation;

/// Current on-disk snapshot format
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Point-in-time copy of every operation, most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub operations: Vec<Operation>,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    version: u32,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            operations,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Write the snapshot as pretty JSON, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file or its directory cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, parent))?;
        }

        // Readers only ever see a complete file
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &staging))?;
        fs::rename(&staging, path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;

        tracing::debug!(
            path = %path.display(),
            operations = self.operations.len(),
            "saved registry snapshot"
        );
        Ok(())
    }

    /// Read a snapshot written by `save`
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound`/`PermissionDenied` for unreadable files,
    /// `UnsupportedFormat` for another format version and
    /// `CorruptedSnapshot` for anything that does not parse or holds an
    /// operation the engine could never have produced.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;
        Ok(Self::from_slice(&bytes, path)?)
    }

    fn from_slice(bytes: &[u8], path: &Path) -> Result<Self, StorageError> {
        let corrupted = |e: serde_json::Error| StorageError::CorruptedSnapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let header: SnapshotHeader = serde_json::from_slice(bytes).map_err(corrupted)?;
        if header.version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::UnsupportedFormat {
                found: header.version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let snapshot: Self = serde_json::from_slice(bytes).map_err(corrupted)?;
        snapshot.verify(&path.display().to_string())?;
        Ok(snapshot)
    }

    /// Check the format version, id uniqueness and every operation's stages
    ///
    /// `origin` names the snapshot in errors (a path, or `<memory>`).
    pub(crate) fn verify(&self, origin: &str) -> Result<(), StorageError> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::UnsupportedFormat {
                found: self.version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }

        let corrupted = |message: String| StorageError::CorruptedSnapshot {
            path: origin.to_string(),
            message,
        };
        let mut seen = HashSet::with_capacity(self.operations.len());
        for operation in &self.operations {
            let operation_id = operation.id();
            if !seen.insert(operation_id) {
                return Err(corrupted(format!("operation {operation_id} appears twice")));
            }
            if let Some(problem) = consistency_violation(operation) {
                return Err(corrupted(format!("operation {operation_id}: {problem}")));
            }
        }
        Ok(())
    }
}
