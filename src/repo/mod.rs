mod amend;
mod jump;
mod snapshot;
mod track;

#[cfg(test)]
mod tests;

pub use amend::Amended;
pub use jump::Jump;
pub use track::Staged;

use crate::error::{MemError, Result};
use crate::history::{HistoryLog, Snapshot, SnapshotDetail};
use crate::lock::RepoLock;
use crate::metadata::Source;
use crate::preferences::Preferences;
use crate::status::{self, StatusReport};
use crate::substrate::{GitSubstrate, Substrate, TreeEntry};
use crate::tracked::{self, IGNORE_FILE, MEM_DIR, TrackedSet};
use git2::Oid;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

const GIT_DIR: &str = "memov.git";
const TRACKED_FILE: &str = "tracked.json";
const LOCK_FILE: &str = "LOCK";
const IGNORE_HEADER: &str = "# Add files/directories to ignore from memov tracking\n";

/// Prompt/response pair supplied with a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Turn {
    pub prompt: Option<String>,
    pub response: Option<String>,
    pub source: Source,
}

impl Turn {
    pub fn new(prompt: Option<String>, response: Option<String>, source: Source) -> Self {
        Self {
            prompt,
            response,
            source,
        }
    }

    pub fn has_text(&self) -> bool {
        self.prompt.is_some() || self.response.is_some()
    }
}

/// Handle on one project: the substrate connection, the latest-snapshot
/// pointer as of when the handle was opened, and the repository lock.
/// Every operation goes through it.
pub struct Repo<S: Substrate = GitSubstrate> {
    root: PathBuf,
    dir: PathBuf,
    substrate: S,
    pub prefs: Preferences,
    /// Parent expected by the next snapshot. Only moved by this handle's own
    /// commits, so a commit from another process shows up as a mismatch.
    latest: Option<Oid>,
    history: Option<Rc<HistoryLog>>,
    _lock: RepoLock,
}

impl Repo<GitSubstrate> {
    /// Create `.mem/`, the bare substrate repository, default preferences and
    /// `.memignore`, and stage `.memignore`. Opening an initialised project
    /// is a no-op.
    pub fn init(root: &Path) -> Result<Self> {
        let root = absolute(root)?;
        let dir = root.join(MEM_DIR);
        if dir.join(GIT_DIR).exists() {
            info!(root = %root.display(), "memov repository already exists");
            return Self::open(&root);
        }
        fs::create_dir_all(&dir).map_err(MemError::io(&dir))?;
        let substrate = GitSubstrate::init(&dir.join(GIT_DIR), &root)?;
        let mut repo = Self::with_substrate(&root, substrate)?;

        let ignore_path = root.join(IGNORE_FILE);
        if !ignore_path.exists() {
            fs::write(&ignore_path, IGNORE_HEADER).map_err(MemError::io(&ignore_path))?;
        }
        let mut tracked = repo.tracked_set()?;
        tracked.add(IGNORE_FILE.to_string());
        repo.save_tracked(&tracked)?;
        info!(root = %root.display(), "initialised memov repository");
        Ok(repo)
    }

    pub fn open(root: &Path) -> Result<Self> {
        let root = absolute(root)?;
        let git_dir = root.join(MEM_DIR).join(GIT_DIR);
        if !git_dir.exists() {
            return Err(MemError::NotInitialized { root });
        }
        let substrate = GitSubstrate::open(&git_dir, &root)?;
        Self::with_substrate(&root, substrate)
    }
}

impl<S: Substrate> Repo<S> {
    /// Lock the project and load preferences. `.mem/` must already exist.
    pub fn with_substrate(root: &Path, substrate: S) -> Result<Self> {
        let dir = root.join(MEM_DIR);
        let lock = RepoLock::acquire(&dir.join(LOCK_FILE))?;
        let prefs = Preferences::load(&dir)?;
        let latest = substrate.latest_commit_id()?;
        debug!(root = %root.display(), latest = ?latest, "opened repository");
        Ok(Self {
            root: root.to_path_buf(),
            dir,
            substrate,
            prefs,
            latest,
            history: None,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tracked_path(&self) -> PathBuf {
        self.dir.join(TRACKED_FILE)
    }

    // ---------------------------------------------------------------
    // History index
    // ---------------------------------------------------------------

    /// Snapshots oldest to newest as the substrate has them right now. The
    /// walk is reused while the latest pointer has not moved.
    pub fn history(&mut self) -> Result<Rc<HistoryLog>> {
        let tip = self.substrate.latest_commit_id()?;
        if let Some(log) = &self.history {
            if log.tip() == tip {
                return Ok(Rc::clone(log));
            }
        }
        let log = Rc::new(HistoryLog::load(&self.substrate)?);
        self.history = Some(Rc::clone(&log));
        Ok(log)
    }

    pub fn resolve(&mut self, reference: &str) -> Result<Snapshot> {
        Ok(self.history()?.resolve(reference)?.clone())
    }

    /// The snapshot plus its diff against the parent snapshot.
    pub fn show(&mut self, reference: &str) -> Result<SnapshotDetail> {
        let snapshot = self.resolve(reference)?;
        let parent_tree = match snapshot.parent_commit_id {
            Some(parent) => Some(self.substrate.read_commit(parent)?.tree_id),
            None => None,
        };
        let changes = self.substrate.diff(parent_tree, snapshot.tree_id)?;
        Ok(SnapshotDetail { snapshot, changes })
    }

    /// The snapshot the working directory is based on.
    pub fn current_snapshot(&mut self) -> Result<Option<Snapshot>> {
        let history = self.history()?;
        let Some(id) = self.substrate.current_commit_id()? else {
            return Ok(None);
        };
        Ok(history
            .by_commit(id)
            .or_else(|| history.latest())
            .cloned())
    }

    pub fn entries_of(&self, snapshot: Option<&Snapshot>) -> Result<Vec<TreeEntry>> {
        match snapshot {
            Some(s) => self.substrate.tree_entries(s.tree_id),
            None => Ok(Vec::new()),
        }
    }

    // ---------------------------------------------------------------
    // Tracked set
    // ---------------------------------------------------------------

    /// The staged tracked set, or the current snapshot's paths when nothing
    /// has been staged since.
    pub fn tracked_set(&mut self) -> Result<TrackedSet> {
        if let Some(set) = TrackedSet::load(&self.tracked_path())? {
            return Ok(set);
        }
        let current = self.current_snapshot()?;
        let entries = self.entries_of(current.as_ref())?;
        Ok(TrackedSet::from_paths(entries.into_iter().map(|e| e.path)))
    }

    fn save_tracked(&self, tracked: &TrackedSet) -> Result<()> {
        tracked.save(&self.tracked_path())?;
        debug!(paths = tracked.len(), "saved tracked set");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    pub fn status(&mut self) -> Result<StatusReport> {
        let current = self.current_snapshot()?;
        let entries = self.entries_of(current.as_ref())?;
        let tracked = self.tracked_set()?;
        status::compute(
            &self.substrate,
            &self.root,
            current.map(|s| s.commit_id),
            &entries,
            &tracked,
        )
    }
}

fn absolute(root: &Path) -> Result<PathBuf> {
    std::path::absolute(root)
        .map(|abs| tracked::normalize(&abs))
        .map_err(MemError::io(root))
}
