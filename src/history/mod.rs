//! Ordered, append-only view of the snapshots reachable from the latest
//! pointer, and resolution of user-supplied references against it.


use crate::error::{MemError, Result};
use crate::metadata::{Operation, SnapshotMetadata, Source};
use crate::substrate::{FileChange, Substrate, oid_hex};
use git2::Oid;
use serde::Serialize;

/// Shortest commit-id prefix accepted as a reference.
pub const MIN_PREFIX_LEN: usize = 4;

/// One recorded prompt/response turn and the file state it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(serialize_with = "oid_hex::serialize")]
    pub commit_id: Oid,
    pub prompt_id: u64,
    pub operation: Operation,
    pub source: Source,
    pub prompt: Option<String>,
    pub response: Option<String>,
    #[serde(serialize_with = "oid_hex::serialize")]
    pub tree_id: Oid,
    #[serde(serialize_with = "oid_hex::serialize_opt")]
    pub parent_commit_id: Option<Oid>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl Snapshot {
    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            prompt_id: self.prompt_id,
            operation: self.operation,
            source: self.source,
            prompt: self.prompt.clone(),
            response: self.response.clone(),
        }
    }

    pub fn short_id(&self) -> String {
        let mut id = self.commit_id.to_string();
        id.truncate(7);
        id
    }
}

/// A snapshot together with its changes against the parent snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDetail {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub changes: Vec<FileChange>,
}

/// Snapshots from oldest to newest, linked by parent ids.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    tip: Option<Oid>,
    entries: Vec<Snapshot>,
}

impl HistoryLog {
    /// Walk the first-parent chain back from the latest pointer. Commits
    /// without memov metadata are not snapshots and are left out.
    pub fn load<S: Substrate>(substrate: &S) -> Result<Self> {
        let tip = substrate.latest_commit_id()?;
        let mut entries = Vec::new();
        let mut next = tip;
        while let Some(id) = next {
            let commit = substrate.read_commit(id)?;
            let metadata = substrate
                .read_metadata(id)?
                .as_ref()
                .and_then(SnapshotMetadata::from_map);
            if let Some(meta) = metadata {
                entries.push(Snapshot {
                    commit_id: commit.id,
                    prompt_id: meta.prompt_id,
                    operation: meta.operation,
                    source: meta.source,
                    prompt: meta.prompt,
                    response: meta.response,
                    tree_id: commit.tree_id,
                    parent_commit_id: commit.parent_id,
                    timestamp: commit.timestamp,
                });
            }
            next = commit.parent_id;
        }
        entries.reverse();
        Ok(Self { tip, entries })
    }

    /// The latest-pointer value this log was built from.
    pub fn tip(&self) -> Option<Oid> {
        self.tip
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    pub fn next_prompt_id(&self) -> u64 {
        self.latest().map_or(1, |s| s.prompt_id + 1)
    }

    pub fn by_commit(&self, id: Oid) -> Option<&Snapshot> {
        self.entries.iter().find(|s| s.commit_id == id)
    }

    /// Resolve a prompt id (exact) or commit-id prefix to one snapshot.
    ///
    /// Only the canonical decimal form names a prompt id, so `0001` is a
    /// commit prefix and never prompt 1.
    pub fn resolve(&self, reference: &str) -> Result<&Snapshot> {
        let reference = reference.trim();
        if let Ok(prompt_id) = reference.parse::<u64>() {
            let canonical = prompt_id.to_string() == reference;
            if let Some(snapshot) = self
                .entries
                .iter()
                .find(|s| canonical && s.prompt_id == prompt_id)
            {
                return Ok(snapshot);
            }
        }
        if reference.len() < MIN_PREFIX_LEN || !reference.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MemError::reference_not_found(reference));
        }

        let prefix = reference.to_ascii_lowercase();
        let matches: Vec<&Snapshot> = self
            .entries
            .iter()
            .filter(|s| s.commit_id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [] => Err(MemError::reference_not_found(reference)),
            [one] => Ok(*one),
            many => Err(MemError::AmbiguousReference {
                reference: reference.to_string(),
                candidates: many
                    .iter()
                    .map(|s| format!("#{} ({})", s.prompt_id, s.short_id()))
                    .collect(),
            }),
        }
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
