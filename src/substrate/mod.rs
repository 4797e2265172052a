//! Boundary to the content-addressable store that actually persists
//! snapshots. The core only talks to [`Substrate`]; [`GitSubstrate`] is the
//! bare-git implementation used by the binary.

mod git;


pub use git::GitSubstrate;

use crate::error::Result;
use git2::Oid;
use serde::Serialize;
use std::collections::BTreeMap;

/// Key/value metadata attached to a commit.
pub type Metadata = BTreeMap<String, String>;

pub const MODE_FILE: u32 = 0o100644;
pub const MODE_EXECUTABLE: u32 = 0o100755;

/// One blob in a tree, addressed by its `/`-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(serialize_with = "oid_hex::serialize")]
    pub id: Oid,
    pub mode: u32,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: Oid,
    pub tree_id: Oid,
    pub parent_id: Option<Oid>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub kind: ChangeKind,
    /// Unified diff for this file; empty for binary content.
    pub patch: String,
}

/// Primitives the snapshot core needs from the version-control store.
///
/// Every method fails with [`MemError::Substrate`](crate::error::MemError)
/// when the store itself fails. [`Substrate::advance_latest`] is the only
/// method that reports
/// [`MemError::ConcurrentModification`](crate::error::MemError) instead.
pub trait Substrate {
    /// Content id `bytes` would get, without writing anything.
    fn hash_object(&self, bytes: &[u8]) -> Result<Oid>;

    /// Content-addressed write. Writing the same bytes twice yields the same id.
    fn write_object(&self, bytes: &[u8]) -> Result<Oid>;

    fn build_tree(&self, entries: &[TreeEntry]) -> Result<Oid>;

    /// All blobs reachable from `tree_id`, sorted by path.
    fn tree_entries(&self, tree_id: Oid) -> Result<Vec<TreeEntry>>;

    /// Create a commit object. No reference is moved.
    fn create_commit(&self, tree_id: Oid, parent: Option<Oid>, message: &str) -> Result<Oid>;

    fn read_commit(&self, commit_id: Oid) -> Result<CommitInfo>;

    /// Replace whatever metadata is attached to `commit_id`.
    fn attach_metadata(&self, commit_id: Oid, metadata: &Metadata) -> Result<()>;

    fn read_metadata(&self, commit_id: Oid) -> Result<Option<Metadata>>;

    /// Drop metadata attached to `commit_id`. Missing metadata is not an error.
    fn detach_metadata(&self, commit_id: Oid) -> Result<()>;

    fn latest_commit_id(&self) -> Result<Option<Oid>>;

    /// Move the latest pointer from `expected` to `new`, failing with
    /// `ConcurrentModification` when it no longer points at `expected`.
    fn advance_latest(&self, expected: Option<Oid>, new: Oid) -> Result<()>;

    /// The snapshot the working directory was last restored to or committed
    /// from. Defaults to the latest commit.
    fn current_commit_id(&self) -> Result<Option<Oid>>;

    fn set_current(&self, commit_id: Oid) -> Result<()>;

    /// Overwrite the working tree with every blob of `commit_id`'s tree.
    fn checkout(&self, commit_id: Oid) -> Result<()>;

    /// Changes from tree `from` (empty when `None`) to tree `to`.
    fn diff(&self, from: Option<Oid>, to: Oid) -> Result<Vec<FileChange>>;
}

/// Hex serialization for object ids.
pub mod oid_hex {
    use git2::Oid;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(oid: &Oid, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(oid)
    }

    pub fn serialize_opt<S: Serializer>(oid: &Option<Oid>, s: S) -> Result<S::Ok, S::Error> {
        match oid {
            Some(oid) => s.collect_str(oid),
            None => s.serialize_none(),
        }
    }
}
