use super::{Repo, Turn};
use crate::error::{MemError, Result};
use crate::history::Snapshot;
use crate::metadata::Operation;
use crate::substrate::Substrate;
use crate::tracked::{self, relative_path};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a tracked-set change: the affected paths, and the snapshot
/// recorded alongside when a prompt or response was supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub paths: Vec<String>,
    pub snapshot: Option<Snapshot>,
}

impl<S: Substrate> Repo<S> {
    /// Add files, or every non-ignored file under a directory, to the
    /// tracked set. Nothing is staged unless every path exists.
    pub fn track(&mut self, paths: &[PathBuf], turn: &Turn) -> Result<Staged> {
        let mut candidates = Vec::new();
        for path in paths {
            let abs = self.root.join(path);
            if !abs.exists() {
                return Err(MemError::path_not_found(path.display().to_string()));
            }
            if abs.is_dir() {
                candidates.extend(tracked::walk_files(&self.root, &abs)?);
                continue;
            }
            let rel = relative_path(&self.root, &abs)?;
            if tracked::is_ignored(&self.root, &rel) {
                debug!(path = %rel, "skipping ignored file");
                continue;
            }
            candidates.push(rel);
        }

        let mut tracked = self.tracked_set()?;
        let added: Vec<String> = candidates
            .into_iter()
            .filter(|rel| tracked.add(rel.clone()))
            .collect();
        if added.is_empty() {
            warn!("no new files to track; all given files are already tracked or ignored");
            return Ok(Staged {
                paths: added,
                snapshot: None,
            });
        }
        self.save_tracked(&tracked)?;
        info!(files = %added.join(", "), "tracking");

        let snapshot = self.record_if_described(turn, Operation::Track)?;
        Ok(Staged {
            paths: added,
            snapshot,
        })
    }

    /// Move a tracked file. Either the tracked set and the file on disk both
    /// change, or neither does.
    pub fn rename(&mut self, old: &Path, new: &Path, turn: &Turn) -> Result<Staged> {
        let old_rel = relative_path(&self.root, old)?;
        let new_rel = relative_path(&self.root, new)?;
        let mut tracked = self.tracked_set()?;
        tracked.rename(&old_rel, &new_rel)?;

        let old_abs = self.root.join(&old_rel);
        let new_abs = self.root.join(&new_rel);
        let moved = match (old_abs.exists(), new_abs.exists()) {
            (true, true) => return Err(MemError::PathConflict { path: new_rel }),
            (false, false) => return Err(MemError::path_not_found(old_rel)),
            (true, false) => {
                if let Some(parent) = new_abs.parent() {
                    fs::create_dir_all(parent).map_err(MemError::io(parent))?;
                }
                fs::rename(&old_abs, &new_abs).map_err(MemError::io(&old_abs))?;
                true
            }
            // Already moved by hand.
            (false, true) => false,
        };

        if let Err(e) = self.save_tracked(&tracked) {
            if moved {
                if let Err(undo) = fs::rename(&new_abs, &old_abs) {
                    warn!(error = %undo, "could not move {new_rel} back to {old_rel}");
                }
            }
            return Err(e);
        }
        info!("renamed {old_rel} -> {new_rel}");

        let snapshot = self.record_if_described(turn, Operation::Rename)?;
        Ok(Staged {
            paths: vec![old_rel, new_rel],
            snapshot,
        })
    }

    /// Stop tracking `path`. The file stays on disk unless `unlink` is set.
    pub fn remove(&mut self, path: &Path, unlink: bool, turn: &Turn) -> Result<Staged> {
        let rel = relative_path(&self.root, path)?;
        let mut tracked = self.tracked_set()?;
        tracked.remove(&rel)?;
        self.save_tracked(&tracked)?;

        if unlink {
            let abs = self.root.join(&rel);
            match fs::remove_file(&abs) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(MemError::Io { path: abs, source: e }),
            }
        }
        info!(path = %rel, unlink, "removed from tracking");

        let snapshot = self.record_if_described(turn, Operation::Remove)?;
        Ok(Staged {
            paths: vec![rel],
            snapshot,
        })
    }

    /// Tracked-set changes are only staged, unless the caller says why they
    /// happened.
    fn record_if_described(&mut self, turn: &Turn, operation: Operation) -> Result<Option<Snapshot>> {
        if turn.has_text() {
            self.snapshot(turn, operation, false)
        } else {
            Ok(None)
        }
    }
}
