//! Checkpoint handler — numbered, immutable snapshots of the shape list.
//!
//! DESIGN
//! ======
//! Storage sits behind the `SnapshotStore` trait: the server runs either the
//! in-memory store or the blob store, which writes one JSON file per
//! checkpoint number and recovers the count by scanning the directory on
//! open. Numbers are assigned monotonically starting at 1; number and
//! generation share an identity space (fetching checkpoint `k` moves the
//! board to generation `k`).

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use board::BoardShape;

/// Checkpoint count of a board that has never been snapshotted.
pub const INITIAL_CHECKPOINT_COUNT: u64 = 0;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(u64),
    #[error("checkpoint io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint blob is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl wire::ErrorCode for CheckpointError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_CHECKPOINT_NOT_FOUND",
            Self::Io(_) => "E_CHECKPOINT_IO",
            Self::Corrupt(_) => "E_CHECKPOINT_CORRUPT",
        }
    }
}

/// Numbered snapshot storage. Implementations are internally synchronized.
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot, assigning the next number. Returns the number.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be written.
    fn save(&self, shapes: &[BoardShape]) -> Result<u64, CheckpointError>;

    /// Load the snapshot stored under `number`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unassigned number, or a storage error.
    fn fetch(&self, number: u64) -> Result<Vec<BoardShape>, CheckpointError>;

    /// How many snapshots have been stored.
    fn count(&self) -> u64;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory snapshot list. Default for tests and ephemeral deployments.
pub struct MemoryStore {
    snapshots: Mutex<Vec<Vec<BoardShape>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self { snapshots: Mutex::new(Vec::new()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, shapes: &[BoardShape]) -> Result<u64, CheckpointError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.push(shapes.to_vec());
        Ok(snapshots.len() as u64)
    }

    fn fetch(&self, number: u64) -> Result<Vec<BoardShape>, CheckpointError> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = usize::try_from(number.checked_sub(1).ok_or(CheckpointError::NotFound(number))?)
            .map_err(|_| CheckpointError::NotFound(number))?;
        snapshots.get(idx).cloned().ok_or(CheckpointError::NotFound(number))
    }

    fn count(&self) -> u64 {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.len() as u64
    }
}

// =============================================================================
// BLOB STORE
// =============================================================================

/// One JSON blob file per checkpoint number under a directory.
pub struct BlobStore {
    dir: PathBuf,
    assigned: Mutex<u64>,
}

impl BlobStore {
    /// Open (or create) a blob directory, recovering the highest assigned
    /// number from the files already present.
    ///
    /// # Errors
    ///
    /// Returns an io error if the directory cannot be created or scanned.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut highest = INITIAL_CHECKPOINT_COUNT;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(number) = parse_blob_number(&entry.path()) {
                highest = highest.max(number);
            }
        }
        Ok(Self { dir, assigned: Mutex::new(highest) })
    }

    fn blob_path(&self, number: u64) -> PathBuf {
        self.dir.join(format!("checkpoint-{number}.json"))
    }
}

fn parse_blob_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("checkpoint-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl SnapshotStore for BlobStore {
    fn save(&self, shapes: &[BoardShape]) -> Result<u64, CheckpointError> {
        let mut assigned = self.assigned.lock().unwrap_or_else(PoisonError::into_inner);
        let number = *assigned + 1;
        let blob = serde_json::to_string(shapes)?;
        std::fs::write(self.blob_path(number), blob)?;
        *assigned = number;
        Ok(number)
    }

    fn fetch(&self, number: u64) -> Result<Vec<BoardShape>, CheckpointError> {
        let path = self.blob_path(number);
        if !path.exists() {
            return Err(CheckpointError::NotFound(number));
        }
        let blob = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&blob)?)
    }

    fn count(&self) -> u64 {
        *self.assigned.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
