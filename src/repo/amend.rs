use super::Repo;
use crate::error::{MemError, Result};
use crate::history::Snapshot;
use crate::metadata::SnapshotMetadata;
use crate::substrate::Substrate;
use tracing::info;

/// Outcome of [`Repo::amend`]. Both variants carry the snapshot as it reads
/// after the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amended {
    Updated(Snapshot),
    Unchanged(Snapshot),
}

impl<S: Substrate> Repo<S> {
    /// Replace the prompt and/or response recorded for a snapshot. The
    /// commit, its tree, parent and prompt id are left alone.
    pub fn amend(
        &mut self,
        reference: &str,
        prompt: Option<String>,
        response: Option<String>,
    ) -> Result<Amended> {
        if prompt.is_none() && response.is_none() {
            return Err(MemError::NothingToAmend);
        }
        let snapshot = self.resolve(reference)?;
        let stored_map = self
            .substrate
            .read_metadata(snapshot.commit_id)?
            .unwrap_or_default();
        let stored = SnapshotMetadata::from_map(&stored_map).unwrap_or_else(|| snapshot.metadata());

        let mut updated = stored.clone();
        if prompt.is_some() {
            updated.prompt = prompt;
        }
        if response.is_some() {
            updated.response = response;
        }
        let amended = Snapshot {
            prompt: updated.prompt.clone(),
            response: updated.response.clone(),
            ..snapshot
        };
        if updated == stored {
            return Ok(Amended::Unchanged(amended));
        }

        let mut map = stored_map;
        map.extend(updated.to_map());
        self.substrate.attach_metadata(amended.commit_id, &map)?;
        self.history = None;
        info!(prompt_id = amended.prompt_id, commit = %amended.commit_id, "amended snapshot metadata");
        Ok(Amended::Updated(amended))
    }
}
