use super::{ChangeKind, CommitInfo, FileChange, Metadata, MODE_EXECUTABLE, Substrate, TreeEntry};
use crate::error::{MemError, Result};
use git2::{
    Delta, DiffFindOptions, DiffOptions, ErrorCode, FileMode, ObjectType, Oid, Repository,
    Signature, TreeWalkMode, TreeWalkResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LATEST_REF: &str = "refs/memov/latest";
pub const CURRENT_REF: &str = "refs/memov/HEAD";
pub const NOTES_REF: &str = "refs/notes/memov";

fn failed(operation: &'static str) -> impl FnOnce(git2::Error) -> MemError {
    move |e| MemError::substrate(operation, e)
}

/// [`Substrate`] over a bare git repository whose checkouts land in a
/// separate working directory.
pub struct GitSubstrate {
    repo: Repository,
    workdir: PathBuf,
}

impl GitSubstrate {
    /// Create the bare repository at `git_dir` unless it already exists.
    pub fn init(git_dir: &Path, workdir: &Path) -> Result<Self> {
        let repo = if git_dir.exists() {
            debug!(path = %git_dir.display(), "bare repository already exists");
            Repository::open_bare(git_dir).map_err(failed("open"))?
        } else {
            debug!(path = %git_dir.display(), "creating bare repository");
            Repository::init_bare(git_dir).map_err(failed("init"))?
        };
        Ok(Self {
            repo,
            workdir: workdir.to_path_buf(),
        })
    }

    pub fn open(git_dir: &Path, workdir: &Path) -> Result<Self> {
        let repo = Repository::open_bare(git_dir).map_err(failed("open"))?;
        Ok(Self {
            repo,
            workdir: workdir.to_path_buf(),
        })
    }

    /// Bare repositories created by `init` have no identity configured, so
    /// fall back to a fixed one.
    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Signature::now("memov", "memov@localhost").map_err(failed("signature")),
        }
    }

    fn read_ref(&self, name: &str) -> Result<Option<Oid>> {
        match self.repo.find_reference(name) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(MemError::substrate("read_ref", e)),
        }
    }
}

impl Substrate for GitSubstrate {
    fn hash_object(&self, bytes: &[u8]) -> Result<Oid> {
        Oid::hash_object(ObjectType::Blob, bytes).map_err(failed("hash_object"))
    }

    fn write_object(&self, bytes: &[u8]) -> Result<Oid> {
        self.repo.blob(bytes).map_err(failed("write_object"))
    }

    fn build_tree(&self, entries: &[TreeEntry]) -> Result<Oid> {
        let empty = self
            .repo
            .treebuilder(None)
            .and_then(|builder| builder.write())
            .map_err(failed("build_tree"))?;
        let base = self.repo.find_tree(empty).map_err(failed("build_tree"))?;
        let mut update = git2::build::TreeUpdateBuilder::new();
        for entry in entries {
            let mode = if entry.mode == MODE_EXECUTABLE {
                FileMode::BlobExecutable
            } else {
                FileMode::Blob
            };
            update.upsert(entry.path.as_str(), entry.id, mode);
        }
        update
            .create_updated(&self.repo, &base)
            .map_err(failed("build_tree"))
    }

    fn tree_entries(&self, tree_id: Oid) -> Result<Vec<TreeEntry>> {
        let tree = self.repo.find_tree(tree_id).map_err(failed("tree_entries"))?;
        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    entries.push(TreeEntry {
                        path: format!("{root}{name}"),
                        id: entry.id(),
                        mode: entry.filemode() as u32,
                    });
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(failed("tree_entries"))?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn create_commit(&self, tree_id: Oid, parent: Option<Oid>, message: &str) -> Result<Oid> {
        let tree = self.repo.find_tree(tree_id).map_err(failed("create_commit"))?;
        let parent = parent
            .map(|id| self.repo.find_commit(id))
            .transpose()
            .map_err(failed("create_commit"))?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parents)
            .map_err(failed("create_commit"))?;
        debug!(commit = %oid, tree = %tree_id, "created commit");
        Ok(oid)
    }

    fn read_commit(&self, commit_id: Oid) -> Result<CommitInfo> {
        let commit = self
            .repo
            .find_commit(commit_id)
            .map_err(failed("read_commit"))?;
        let parent_id = if commit.parent_count() > 0 {
            Some(commit.parent_id(0).map_err(failed("read_commit"))?)
        } else {
            None
        };
        Ok(CommitInfo {
            id: commit.id(),
            tree_id: commit.tree_id(),
            parent_id,
            timestamp: commit.time().seconds(),
            message: commit.message().unwrap_or_default().to_string(),
        })
    }

    fn attach_metadata(&self, commit_id: Oid, metadata: &Metadata) -> Result<()> {
        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| MemError::substrate("attach_metadata", e))?;
        let sig = self.signature()?;
        self.repo
            .note(&sig, &sig, Some(NOTES_REF), commit_id, &content, true)
            .map_err(failed("attach_metadata"))?;
        debug!(commit = %commit_id, "attached metadata");
        Ok(())
    }

    fn read_metadata(&self, commit_id: Oid) -> Result<Option<Metadata>> {
        let note = match self.repo.find_note(Some(NOTES_REF), commit_id) {
            Ok(note) => note,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(MemError::substrate("read_metadata", e)),
        };
        let Some(message) = note.message() else {
            return Ok(None);
        };
        let metadata = serde_json::from_str(message)
            .map_err(|e| MemError::substrate("read_metadata", e))?;
        Ok(Some(metadata))
    }

    fn detach_metadata(&self, commit_id: Oid) -> Result<()> {
        let sig = self.signature()?;
        match self.repo.note_delete(commit_id, Some(NOTES_REF), &sig, &sig) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(MemError::substrate("detach_metadata", e)),
        }
    }

    fn latest_commit_id(&self) -> Result<Option<Oid>> {
        self.read_ref(LATEST_REF)
    }

    fn advance_latest(&self, expected: Option<Oid>, new: Oid) -> Result<()> {
        let result = match expected {
            Some(current) => self.repo.reference_matching(
                LATEST_REF,
                new,
                true,
                current,
                "memov: advance latest",
            ),
            None => self
                .repo
                .reference(LATEST_REF, new, false, "memov: first snapshot"),
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Exists) => {
                Err(MemError::ConcurrentModification {
                    detail: format!(
                        "{LATEST_REF} moved away from {}",
                        expected.map_or_else(|| "nothing".to_string(), |id| id.to_string())
                    ),
                })
            }
            Err(e) => Err(MemError::substrate("advance_latest", e)),
        }
    }

    fn current_commit_id(&self) -> Result<Option<Oid>> {
        match self.read_ref(CURRENT_REF)? {
            Some(id) => Ok(Some(id)),
            None => self.latest_commit_id(),
        }
    }

    fn set_current(&self, commit_id: Oid) -> Result<()> {
        self.repo
            .reference(CURRENT_REF, commit_id, true, "memov: move current")
            .map_err(failed("set_current"))?;
        Ok(())
    }

    fn checkout(&self, commit_id: Oid) -> Result<()> {
        let info = self.read_commit(commit_id)?;
        for entry in self.tree_entries(info.tree_id)? {
            let blob = self.repo.find_blob(entry.id).map_err(failed("checkout"))?;
            let dest = self.workdir.join(&entry.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| MemError::substrate("checkout", e))?;
            }
            fs::write(&dest, blob.content()).map_err(|e| MemError::substrate("checkout", e))?;
            set_mode(&dest, entry.mode)?;
        }
        debug!(commit = %commit_id, "checked out");
        Ok(())
    }

    fn diff(&self, from: Option<Oid>, to: Oid) -> Result<Vec<FileChange>> {
        let old_tree = from
            .map(|id| self.repo.find_tree(id))
            .transpose()
            .map_err(failed("diff"))?;
        let new_tree = self.repo.find_tree(to).map_err(failed("diff"))?;
        let mut opts = DiffOptions::new();
        opts.context_lines(3);
        let mut diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))
            .map_err(failed("diff"))?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))
            .map_err(failed("diff"))?;

        let mut changes = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let kind = match delta.status() {
                Delta::Added => ChangeKind::Added,
                Delta::Deleted => ChangeKind::Deleted,
                Delta::Renamed => ChangeKind::Renamed,
                _ => ChangeKind::Modified,
            };
            let new_path = delta.new_file().path().map(path_string);
            let old_path = delta.old_file().path().map(path_string);
            let path = new_path.clone().or_else(|| old_path.clone()).unwrap_or_default();
            let patch = match git2::Patch::from_diff(&diff, idx).map_err(failed("diff"))? {
                Some(mut patch) => {
                    let buf = patch.to_buf().map_err(failed("diff"))?;
                    String::from_utf8_lossy(&buf).into_owned()
                }
                None => String::new(),
            };
            changes.push(FileChange {
                old_path: if kind == ChangeKind::Renamed { old_path } else { None },
                path,
                kind,
                patch,
            });
        }
        Ok(changes)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = if mode == MODE_EXECUTABLE { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
        .map_err(|e| MemError::substrate("checkout", e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
