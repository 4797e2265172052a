use super::Repo;
use crate::error::{MemError, Result};
use crate::history::Snapshot;
use crate::status::read_tracked;
use crate::substrate::{Substrate, TreeEntry};
use crate::tracked::TrackedSet;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use tracing::{info, warn};

/// Outcome of [`Repo::jump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jump {
    Moved { from: Option<Snapshot>, to: Snapshot },
    AlreadyCurrent(Snapshot),
}

impl<S: Substrate> Repo<S> {
    /// Restore the working directory to `reference`'s recorded state.
    ///
    /// Refuses to touch anything while tracked files differ from the current
    /// snapshot, or while an untracked file sits where the target would write
    /// different content. History is never modified; only the current pointer
    /// moves.
    pub fn jump(&mut self, reference: &str) -> Result<Jump> {
        let status = self.status()?;
        let dirty = status.dirty_paths();
        if !dirty.is_empty() {
            return Err(MemError::DirtyWorkingTree { paths: dirty });
        }

        let target = self.resolve(reference)?;
        let current = self.current_snapshot()?;
        if current.as_ref().map(|c| c.commit_id) == Some(target.commit_id) {
            return Ok(Jump::AlreadyCurrent(target));
        }

        let current_entries = self.entries_of(current.as_ref())?;
        let target_entries = self.substrate.tree_entries(target.tree_id)?;
        let known: BTreeSet<&str> = current_entries.iter().map(|e| e.path.as_str()).collect();

        // Target-only paths already on disk: identical ones are kept through a
        // rollback, different ones would be clobbered.
        let mut preexisting = BTreeSet::new();
        let mut clobbered = Vec::new();
        for entry in target_entries.iter().filter(|e| !known.contains(e.path.as_str())) {
            let on_disk = read_tracked(&self.root, &entry.path).map_err(|source| MemError::Staging {
                path: entry.path.clone(),
                source,
            })?;
            if let Some((bytes, mode)) = on_disk {
                if mode == entry.mode && self.substrate.hash_object(&bytes)? == entry.id {
                    preexisting.insert(entry.path.clone());
                } else {
                    clobbered.push(entry.path.clone());
                }
            }
        }
        if !clobbered.is_empty() {
            return Err(MemError::DirtyWorkingTree { paths: clobbered });
        }

        let tracked_before = self.tracked_set()?;
        if let Err(e) = self.restore(&target, &current_entries, &target_entries) {
            self.roll_back(current.as_ref(), &known, &target_entries, &preexisting, &tracked_before);
            return Err(e);
        }
        info!(prompt_id = target.prompt_id, commit = %target.commit_id, "jumped");
        Ok(Jump::Moved {
            from: current,
            to: target,
        })
    }

    fn restore(
        &mut self,
        target: &Snapshot,
        current_entries: &[TreeEntry],
        target_entries: &[TreeEntry],
    ) -> Result<()> {
        self.substrate.checkout(target.commit_id)?;

        let keep: BTreeSet<&str> = target_entries.iter().map(|e| e.path.as_str()).collect();
        for stale in current_entries.iter().filter(|e| !keep.contains(e.path.as_str())) {
            let path = self.root.join(&stale.path);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(MemError::Io { path, source: e }),
            }
        }

        self.substrate.set_current(target.commit_id)?;
        let tracked = TrackedSet::from_paths(target_entries.iter().map(|e| e.path.clone()));
        self.save_tracked(&tracked)
    }

    /// Best-effort return to the pre-jump state. Re-checking out the current
    /// snapshot brings back deleted files; files only the target wrote are
    /// removed again.
    fn roll_back(
        &mut self,
        current: Option<&Snapshot>,
        known: &BTreeSet<&str>,
        target_entries: &[TreeEntry],
        preexisting: &BTreeSet<String>,
        tracked_before: &TrackedSet,
    ) {
        if let Some(current) = current {
            if let Err(e) = self.substrate.checkout(current.commit_id) {
                warn!(error = %e, "could not restore working tree after failed jump");
            }
            if let Err(e) = self.substrate.set_current(current.commit_id) {
                warn!(error = %e, "could not restore current snapshot pointer");
            }
        }
        for entry in target_entries
            .iter()
            .filter(|e| !known.contains(e.path.as_str()) && !preexisting.contains(&e.path))
        {
            let path = self.root.join(&entry.path);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "could not remove file written by failed jump");
                }
            }
        }
        if let Err(e) = self.save_tracked(tracked_before) {
            warn!(error = %e, "could not restore tracked set after failed jump");
        }
    }
}
