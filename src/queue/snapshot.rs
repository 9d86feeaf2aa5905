//! Persistence for queue state.
//!
//! The snapshot is a small TOML file rewritten after every queue mutation. It
//! is written to a temporary sibling and renamed into place so a crash never
//! leaves a half-written file behind.

use crate::error::{Error, Result};
use crate::types::{MergeRequest, MergeStatus, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Directory name under the platform data dir.
const APP_DIR: &str = "mergequeue";

/// Default snapshot filename.
const SNAPSHOT_FILE: &str = "queue.toml";

/// Default snapshot location (`~/.local/share/mergequeue/queue.toml` on Linux).
pub fn default_snapshot_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join(SNAPSHOT_FILE))
}

/// One persisted queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Repository full name
    pub repo: String,
    /// Pull request number
    pub number: u64,
    /// Head branch
    pub source_ref: String,
    /// Base branch
    pub target_ref: String,
    /// Who asked for the merge
    pub requester: String,
    /// Admission time
    pub arrived_at: DateTime<Utc>,
    /// Status at the time of the snapshot
    pub status: MergeStatus,
}

impl From<&MergeRequest> for SnapshotEntry {
    fn from(request: &MergeRequest) -> Self {
        Self {
            repo: request.id.repo.clone(),
            number: request.id.number,
            source_ref: request.source_ref.clone(),
            target_ref: request.target_ref.clone(),
            requester: request.requester.clone(),
            arrived_at: request.arrived_at,
            status: request.status,
        }
    }
}

impl From<SnapshotEntry> for MergeRequest {
    fn from(entry: SnapshotEntry) -> Self {
        Self {
            id: RequestId::new(entry.repo, entry.number),
            source_ref: entry.source_ref,
            target_ref: entry.target_ref,
            requester: entry.requester,
            arrived_at: entry.arrived_at,
            status: entry.status,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    version: u32,
    #[serde(default)]
    entries: Vec<SnapshotEntry>,
}

/// Reads and writes the queue snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved entries in queue order.
    ///
    /// Returns an empty list if the file doesn't exist.
    pub fn load(&self) -> Result<Vec<MergeRequest>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Snapshot(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let snapshot: QueueSnapshot = toml::from_str(&content).map_err(|e| {
            Error::Snapshot(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {} in {} (expected {SNAPSHOT_VERSION})",
                snapshot.version,
                self.path.display()
            )));
        }

        Ok(snapshot.entries.into_iter().map(MergeRequest::from).collect())
    }

    /// Save entries, replacing the previous snapshot.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self, entries: &[MergeRequest]) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Snapshot(format!("failed to create {}: {e}", dir.display())))?;
        }

        let snapshot = QueueSnapshot {
            version: SNAPSHOT_VERSION,
            entries: entries.iter().map(SnapshotEntry::from).collect(),
        };

        let content = toml::to_string_pretty(&snapshot)
            .map_err(|e| Error::Snapshot(format!("failed to serialize queue snapshot: {e}")))?;

        let content_with_header = format!(
            "# mergequeue queue snapshot\n# Auto-generated - manual edits may be overwritten\n\n{content}"
        );

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content_with_header)
            .map_err(|e| Error::Snapshot(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Snapshot(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        Ok(())
    }
}
