//! Working-directory drift relative to the current snapshot. Read-only.

use crate::error::{MemError, Result};
use crate::substrate::{MODE_EXECUTABLE, MODE_FILE, Substrate, TreeEntry};
use crate::tracked::{self, TrackedSet};
use git2::Oid;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unchanged,
    Modified,
    /// Tracked, but not yet part of the baseline snapshot.
    Added,
    Missing,
}

impl FileState {
    pub fn label(self) -> &'static str {
        match self {
            FileState::Unchanged => "unchanged",
            FileState::Modified => "modified",
            FileState::Added => "added",
            FileState::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStatus {
    pub path: String,
    pub state: FileState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    #[serde(serialize_with = "crate::substrate::oid_hex::serialize_opt")]
    pub baseline: Option<Oid>,
    pub tracked: Vec<PathStatus>,
    /// In the baseline snapshot but no longer tracked.
    pub removed: Vec<String>,
    /// On disk, not tracked. Informational only.
    pub untracked: Vec<String>,
}

impl StatusReport {
    pub fn state_of(&self, path: &str) -> Option<FileState> {
        self.tracked
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.state)
    }

    /// Paths that would be lost or overwritten by restoring another snapshot.
    pub fn dirty_paths(&self) -> Vec<String> {
        self.tracked
            .iter()
            .filter(|p| p.state != FileState::Unchanged)
            .map(|p| p.path.clone())
            .chain(self.removed.iter().cloned())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.dirty_paths().is_empty()
    }
}

/// Read a tracked file and its git mode. `None` when it is not on disk.
pub fn read_tracked(root: &Path, path: &str) -> io::Result<Option<(Vec<u8>, u32)>> {
    let abs = root.join(path);
    let meta = match fs::metadata(&abs) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !meta.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&abs)?;
    Ok(Some((bytes, file_mode(&meta))))
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o111 != 0 {
        MODE_EXECUTABLE
    } else {
        MODE_FILE
    }
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    MODE_FILE
}

/// Compare every tracked path against `baseline_entries` (the current
/// snapshot's tree) and list untracked files on disk.
pub fn compute<S: Substrate>(
    substrate: &S,
    root: &Path,
    baseline: Option<Oid>,
    baseline_entries: &[TreeEntry],
    tracked: &TrackedSet,
) -> Result<StatusReport> {
    let by_path: BTreeMap<&str, &TreeEntry> = baseline_entries
        .iter()
        .map(|e| (e.path.as_str(), e))
        .collect();

    let mut report = StatusReport {
        baseline,
        ..Default::default()
    };
    for path in tracked.iter() {
        let on_disk = read_tracked(root, path).map_err(|source| MemError::Staging {
            path: path.to_string(),
            source,
        })?;
        let state = match (on_disk, by_path.get(path)) {
            (None, _) => FileState::Missing,
            (Some(_), None) => FileState::Added,
            (Some((bytes, mode)), Some(entry)) => {
                if substrate.hash_object(&bytes)? == entry.id && mode == entry.mode {
                    FileState::Unchanged
                } else {
                    FileState::Modified
                }
            }
        };
        report.tracked.push(PathStatus {
            path: path.to_string(),
            state,
        });
    }

    report.removed = baseline_entries
        .iter()
        .filter(|e| !tracked.contains(&e.path))
        .map(|e| e.path.clone())
        .collect();
    report.untracked = tracked::walk_files(root, root)?
        .into_iter()
        .filter(|p| !tracked.contains(p))
        .collect();
    Ok(report)
}
