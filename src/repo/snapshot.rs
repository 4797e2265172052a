use super::{Repo, Turn};
use crate::error::{MemError, Result};
use crate::history::Snapshot;
use crate::metadata::{Operation, SnapshotMetadata};
use crate::preferences::FILENAME as PREFERENCES_FILE;
use crate::status::read_tracked;
use crate::substrate::{Substrate, TreeEntry, oid_hex};
use crate::tracked::{self, TrackedSet};
use git2::Oid;
use minijinja::{Environment, context};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use tracing::{info, warn};

/// Everything a snapshot needs, staged and validated but not yet visible in
/// history. Committing it is the only step that moves the latest pointer.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSnapshot {
    pub parent: Option<Snapshot>,
    pub entries: Vec<TreeEntry>,
    #[serde(serialize_with = "oid_hex::serialize")]
    pub tree_id: Oid,
    pub metadata: SnapshotMetadata,
}

impl PendingSnapshot {
    /// Same tree as the parent snapshot.
    pub fn is_unchanged(&self) -> bool {
        self.parent.as_ref().map(|p| p.tree_id) == Some(self.tree_id)
    }

    /// Identical tree and nothing to say about it.
    pub fn is_noop(&self, force_empty: bool) -> bool {
        self.is_unchanged() && !self.metadata.has_text() && !force_empty
    }
}

impl<S: Substrate> Repo<S> {
    /// Record the tracked files' current content as a new snapshot.
    ///
    /// Returns `None` when the tree is unchanged, no prompt or response was
    /// given and `force_empty` is off, or when nothing has ever been tracked.
    pub fn snapshot(
        &mut self,
        turn: &Turn,
        operation: Operation,
        force_empty: bool,
    ) -> Result<Option<Snapshot>> {
        let tracked = self.tracked_set()?;
        if tracked.is_empty() && self.latest.is_none() {
            warn!("no tracked files to snapshot; track files first");
            return Ok(None);
        }
        let pending = self.prepare(&tracked, turn, operation)?;
        if pending.is_noop(force_empty) {
            warn!("nothing changed since the last snapshot; skipping");
            return Ok(None);
        }
        self.commit(pending).map(Some)
    }

    /// Stage every tracked path and build the tree. Writes content objects
    /// only; nothing becomes reachable from history.
    pub fn prepare(
        &mut self,
        tracked: &TrackedSet,
        turn: &Turn,
        operation: Operation,
    ) -> Result<PendingSnapshot> {
        let history = self.history()?;
        if history.tip() != self.latest {
            return Err(MemError::ConcurrentModification {
                detail: "latest snapshot moved since this command started".into(),
            });
        }
        let parent = match self.latest {
            Some(id) => Some(history.by_commit(id).cloned().ok_or_else(|| {
                MemError::ConcurrentModification {
                    detail: format!("latest commit {id} is not a memov snapshot"),
                }
            })?),
            None => None,
        };

        let inherited: BTreeMap<String, TreeEntry> = self
            .entries_of(parent.as_ref())?
            .into_iter()
            .map(|e| (e.path.clone(), e))
            .collect();

        let mut entries = Vec::with_capacity(tracked.len());
        for path in tracked.iter() {
            let (bytes, mode) = read_tracked(&self.root, path)
                .and_then(|found| {
                    found.ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            "tracked file is missing; restore it or `mem remove` it",
                        )
                    })
                })
                .map_err(|source| MemError::Staging {
                    path: path.to_string(),
                    source,
                })?;

            let id = self.substrate.hash_object(&bytes)?;
            let entry = match inherited.get(path) {
                Some(prev) if prev.id == id && prev.mode == mode => prev.clone(),
                _ => TreeEntry {
                    path: path.to_string(),
                    id: self.substrate.write_object(&bytes)?,
                    mode,
                },
            };
            entries.push(entry);
        }

        let untracked: Vec<String> = tracked::walk_files(&self.root, &self.root)?
            .into_iter()
            .filter(|p| !tracked.contains(p))
            .collect();
        if !untracked.is_empty() {
            warn!(
                files = %untracked.join(", "),
                "untracked files present; they are not part of the snapshot"
            );
        }

        let tree_id = self.substrate.build_tree(&entries)?;
        Ok(PendingSnapshot {
            metadata: SnapshotMetadata {
                prompt_id: history.next_prompt_id(),
                operation,
                source: turn.source,
                prompt: turn.prompt.clone(),
                response: turn.response.clone(),
            },
            parent,
            entries,
            tree_id,
        })
    }

    /// Create the commit, attach its metadata and point `current` at it, and
    /// only then advance the latest pointer. A failure before the pointer
    /// moves leaves at most unreferenced objects behind; once it has moved the
    /// snapshot is recorded and the call succeeds.
    pub fn commit(&mut self, pending: PendingSnapshot) -> Result<Snapshot> {
        let expected = pending.parent.as_ref().map(|p| p.commit_id);
        let actual = self.substrate.latest_commit_id()?;
        if actual != expected {
            return Err(MemError::ConcurrentModification {
                detail: format!(
                    "expected latest {}, found {}",
                    describe(expected),
                    describe(actual)
                ),
            });
        }
        let previous_current = self.substrate.current_commit_id()?;

        let message = self.render_message(&pending.metadata)?;
        let commit_id = self
            .substrate
            .create_commit(pending.tree_id, expected, &message)?;
        self.substrate
            .attach_metadata(commit_id, &pending.metadata.to_map())?;
        let commit = match self.substrate.read_commit(commit_id) {
            Ok(commit) => commit,
            Err(e) => {
                self.abandon(commit_id);
                return Err(e);
            }
        };
        if let Err(e) = self.substrate.set_current(commit_id) {
            self.abandon(commit_id);
            return Err(e);
        }
        if let Err(e) = self.substrate.advance_latest(expected, commit_id) {
            // An unset pointer already falls back to latest.
            if let Some(previous) = previous_current {
                if let Err(restore) = self.substrate.set_current(previous) {
                    warn!(error = %restore, "could not restore current snapshot pointer");
                }
            }
            self.abandon(commit_id);
            return Err(e);
        }
        self.latest = Some(commit_id);
        self.history = None;

        let tracked = TrackedSet::from_paths(pending.entries.iter().map(|e| e.path.clone()));
        if let Err(e) = self.save_tracked(&tracked) {
            warn!(error = %e, "snapshot recorded but the tracked set was not saved");
        }

        let meta = pending.metadata;
        info!(
            prompt_id = meta.prompt_id,
            commit = %commit_id,
            operation = %meta.operation,
            "recorded snapshot"
        );
        Ok(Snapshot {
            commit_id,
            prompt_id: meta.prompt_id,
            operation: meta.operation,
            source: meta.source,
            prompt: meta.prompt,
            response: meta.response,
            tree_id: pending.tree_id,
            parent_commit_id: expected,
            timestamp: commit.timestamp,
        })
    }

    fn abandon(&self, commit_id: Oid) {
        if let Err(e) = self.substrate.detach_metadata(commit_id) {
            warn!(commit = %commit_id, error = %e, "could not drop metadata of abandoned commit");
        }
    }

    fn render_message(&self, meta: &SnapshotMetadata) -> Result<String> {
        let config_error = |e: minijinja::Error| MemError::Config {
            path: self.dir.join(PREFERENCES_FILE),
            detail: format!("commit template: {e}"),
        };
        let template = self.prefs.commit_template(&self.dir)?;
        let env = Environment::new();
        let tmpl = env.template_from_str(&template).map_err(config_error)?;
        tmpl.render(context! {
            operation => meta.operation.as_str(),
            prompt_id => meta.prompt_id,
            prompt => meta.prompt.as_deref(),
            response => meta.response.as_deref(),
            source => meta.source.as_str(),
        })
        .map_err(config_error)
    }
}

fn describe(id: Option<Oid>) -> String {
    id.map_or_else(|| "no snapshot".to_string(), |id| id.to_string())
}
