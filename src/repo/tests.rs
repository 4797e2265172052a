use super::*;
use crate::metadata::Operation;
use crate::status::FileState;
use crate::substrate::{CommitInfo, FileChange, Metadata};
use std::path::Path;

fn project() -> (tempfile::TempDir, Repo) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repo::init(dir.path()).unwrap();
    (dir, repo)
}

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

fn said(prompt: &str) -> Turn {
    Turn::new(Some(prompt.into()), None, Source::Ai)
}

fn quiet() -> Turn {
    Turn::default()
}

/// Track `a.txt` and record it as prompt 1.
fn first_snapshot(repo: &mut Repo) -> Snapshot {
    let root = repo.root().to_path_buf();
    write(&root, "a.txt", "v1");
    repo.track(&[PathBuf::from("a.txt")], &quiet()).unwrap();
    repo.snapshot(&said("create a"), Operation::Snap, false)
        .unwrap()
        .unwrap()
}

fn tracked_paths(repo: &mut Repo) -> Vec<String> {
    repo.tracked_set()
        .unwrap()
        .iter()
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------
// init / open
// ---------------------------------------------------------------

#[test]
fn init_stages_memignore() {
    let (dir, mut repo) = project();
    assert!(dir.path().join(".memignore").is_file());
    assert!(dir.path().join(".mem/memov.toml").is_file());
    assert_eq!(tracked_paths(&mut repo), [".memignore"]);
    assert!(repo.history().unwrap().is_empty());

    drop(repo);
    let mut again = Repo::init(dir.path()).unwrap();
    assert_eq!(tracked_paths(&mut again), [".memignore"]);
}

#[test]
fn open_requires_init() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Repo::open(dir.path()),
        Err(MemError::NotInitialized { .. })
    ));
}

#[test]
fn second_handle_is_locked_out() {
    let (dir, _repo) = project();
    assert!(matches!(
        Repo::open(dir.path()),
        Err(MemError::ConcurrentModification { .. })
    ));
}

// ---------------------------------------------------------------
// track / snapshot
// ---------------------------------------------------------------

#[test]
fn track_then_snap_then_jump_back() {
    let (dir, mut repo) = project();
    let root = dir.path();

    write(root, "a.txt", "v1");
    let staged = repo.track(&[PathBuf::from("a.txt")], &quiet()).unwrap();
    assert_eq!(staged.paths, ["a.txt"]);
    assert!(staged.snapshot.is_none());
    assert!(repo.history().unwrap().is_empty());

    let first = repo
        .snapshot(&said("create a"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    assert_eq!(first.prompt_id, 1);
    assert_eq!(first.parent_commit_id, None);
    assert_eq!(repo.history().unwrap().len(), 1);

    write(root, "a.txt", "v2");
    let second = repo
        .snapshot(&said("edit a"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    assert_eq!(second.prompt_id, 2);
    assert_eq!(second.parent_commit_id, Some(first.commit_id));

    let jumped = repo.jump("1").unwrap();
    assert!(matches!(jumped, Jump::Moved { ref to, .. } if to.commit_id == first.commit_id));
    assert_eq!(read(root, "a.txt"), "v1");
    assert!(repo.status().unwrap().is_clean());
    assert_eq!(repo.history().unwrap().len(), 2);
}

#[test]
fn tracked_set_persists_across_handles() {
    let (dir, mut repo) = project();
    write(dir.path(), "a.txt", "v1");
    repo.track(&[PathBuf::from("a.txt")], &quiet()).unwrap();
    drop(repo);

    let mut reopened = Repo::open(dir.path()).unwrap();
    assert_eq!(tracked_paths(&mut reopened), [".memignore", "a.txt"]);
}

#[test]
fn track_with_prompt_records_a_track_snapshot() {
    let (dir, mut repo) = project();
    write(dir.path(), "a.txt", "v1");
    let staged = repo
        .track(&[PathBuf::from("a.txt")], &said("add a"))
        .unwrap();
    let snapshot = staged.snapshot.unwrap();
    assert_eq!(snapshot.operation, Operation::Track);
    assert_eq!(snapshot.prompt.as_deref(), Some("add a"));
}

#[test]
fn track_walks_directories_and_skips_ignored() {
    let (dir, mut repo) = project();
    let root = dir.path();
    fs::write(root.join(".memignore"), "*.log\n").unwrap();
    write(root, "src/main.rs", "fn main() {}");
    write(root, "src/nested/util.rs", "");
    write(root, "src/debug.log", "noise");
    write(root, "top.log", "noise");

    let staged = repo
        .track(&[PathBuf::from("src"), PathBuf::from("top.log")], &quiet())
        .unwrap();
    assert_eq!(staged.paths, ["src/main.rs", "src/nested/util.rs"]);

    let again = repo.track(&[PathBuf::from("src")], &quiet()).unwrap();
    assert!(again.paths.is_empty());
}

#[test]
fn track_validates_every_path_first() {
    let (dir, mut repo) = project();
    write(dir.path(), "a.txt", "v1");
    let err = repo
        .track(&[PathBuf::from("a.txt"), PathBuf::from("nope.txt")], &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::NotFound { what: "path", .. }));
    assert_eq!(tracked_paths(&mut repo), [".memignore"]);

    let err = repo
        .track(&[PathBuf::from(".mem/tracked.json")], &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::InvalidPath { .. }));
}

#[test]
fn unchanged_snapshot_is_skipped_unless_forced() {
    let (_dir, mut repo) = project();
    let first = first_snapshot(&mut repo);

    assert_eq!(repo.snapshot(&quiet(), Operation::Snap, false).unwrap(), None);
    assert_eq!(repo.history().unwrap().len(), 1);

    let forced = repo
        .snapshot(&quiet(), Operation::Snap, true)
        .unwrap()
        .unwrap();
    assert_eq!(forced.tree_id, first.tree_id);
    assert_eq!(forced.parent_commit_id, Some(first.commit_id));
    assert_eq!(forced.prompt, None);
}

#[test]
fn prompt_without_changes_is_recorded() {
    let (_dir, mut repo) = project();
    let first = first_snapshot(&mut repo);
    let thinking = repo
        .snapshot(&said("just thinking"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    assert_eq!(thinking.tree_id, first.tree_id);
    assert_eq!(thinking.prompt_id, 2);
}

#[test]
fn snapshot_without_anything_tracked_is_skipped() {
    let (dir, mut repo) = project();
    repo.remove(Path::new(".memignore"), false, &quiet()).unwrap();
    write(dir.path(), "a.txt", "untracked");
    assert_eq!(repo.snapshot(&said("x"), Operation::Snap, true).unwrap(), None);
    assert!(repo.history().unwrap().is_empty());
}

#[test]
fn missing_tracked_file_fails_staging() {
    let (dir, mut repo) = project();
    first_snapshot(&mut repo);
    fs::remove_file(dir.path().join("a.txt")).unwrap();

    let err = repo
        .snapshot(&said("oops"), Operation::Snap, false)
        .unwrap_err();
    assert!(matches!(err, MemError::Staging { ref path, .. } if path == "a.txt"));
    assert_eq!(repo.history().unwrap().len(), 1);
}

#[test]
fn unchanged_files_reuse_parent_objects() {
    let (dir, mut repo) = project();
    let root = dir.path();
    let first = first_snapshot(&mut repo);
    write(root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();
    let second = repo
        .snapshot(&said("add b"), Operation::Snap, false)
        .unwrap()
        .unwrap();

    let before = repo.entries_of(Some(&first)).unwrap();
    let after = repo.entries_of(Some(&second)).unwrap();
    let a_before = before.iter().find(|e| e.path == "a.txt").unwrap();
    let a_after = after.iter().find(|e| e.path == "a.txt").unwrap();
    assert_eq!(a_before, a_after);
    assert_eq!(after.len(), 3);
}

#[test]
fn commit_message_uses_template() {
    let (_dir, mut repo) = project();
    let first = first_snapshot(&mut repo);
    let commit = repo.substrate.read_commit(first.commit_id).unwrap();
    assert_eq!(commit.message, "snap #1: create a");
}

// ---------------------------------------------------------------
// status
// ---------------------------------------------------------------

#[test]
fn status_reports_each_kind_of_drift() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();
    write(root, "a.txt", "changed");
    write(root, "loose.txt", "not tracked");
    repo.remove(Path::new(".memignore"), false, &quiet()).unwrap();

    let status = repo.status().unwrap();
    assert_eq!(status.state_of("a.txt"), Some(FileState::Modified));
    assert_eq!(status.state_of("b.txt"), Some(FileState::Added));
    assert_eq!(status.removed, [".memignore"]);
    assert!(status.untracked.contains(&"loose.txt".to_string()));

    fs::remove_file(root.join("a.txt")).unwrap();
    let status = repo.status().unwrap();
    assert_eq!(status.state_of("a.txt"), Some(FileState::Missing));
}

#[test]
fn status_is_read_only() {
    let (dir, mut repo) = project();
    first_snapshot(&mut repo);
    write(dir.path(), "a.txt", "changed");
    let tip = repo.substrate.latest_commit_id().unwrap();
    repo.status().unwrap();
    repo.status().unwrap();
    assert_eq!(repo.substrate.latest_commit_id().unwrap(), tip);
    assert_eq!(read(dir.path(), "a.txt"), "changed");
}

// ---------------------------------------------------------------
// rename / remove
// ---------------------------------------------------------------

#[test]
fn rename_moves_file_and_tracking() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);

    let staged = repo
        .rename(Path::new("a.txt"), Path::new("docs/a.md"), &said("move a"))
        .unwrap();
    assert_eq!(staged.paths, ["a.txt", "docs/a.md"]);
    assert!(!root.join("a.txt").exists());
    assert_eq!(read(root, "docs/a.md"), "v1");
    assert_eq!(tracked_paths(&mut repo), [".memignore", "docs/a.md"]);
    assert_eq!(staged.snapshot.unwrap().operation, Operation::Rename);
}

#[test]
fn rename_after_manual_move() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();

    repo.rename(Path::new("a.txt"), Path::new("b.txt"), &quiet())
        .unwrap();
    assert_eq!(tracked_paths(&mut repo), [".memignore", "b.txt"]);
}

#[test]
fn rename_failures_change_nothing() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "b.txt", "in the way");

    let err = repo
        .rename(Path::new("a.txt"), Path::new("b.txt"), &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::PathConflict { .. }));
    assert_eq!(read(root, "a.txt"), "v1");
    assert_eq!(read(root, "b.txt"), "in the way");

    let err = repo
        .rename(Path::new("a.txt"), Path::new(".memignore"), &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::PathConflict { .. }));

    let err = repo
        .rename(Path::new("zzz.txt"), Path::new("c.txt"), &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::NotTracked { .. }));

    fs::remove_file(root.join("a.txt")).unwrap();
    fs::remove_file(root.join("b.txt")).unwrap();
    let err = repo
        .rename(Path::new("a.txt"), Path::new("b.txt"), &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::NotFound { .. }));
    assert_eq!(tracked_paths(&mut repo), [".memignore", "a.txt"]);
}

#[test]
fn remove_untracked_path_changes_nothing() {
    let (dir, mut repo) = project();
    first_snapshot(&mut repo);
    write(dir.path(), "loose.txt", "x");

    let err = repo
        .remove(Path::new("loose.txt"), true, &quiet())
        .unwrap_err();
    assert!(matches!(err, MemError::NotTracked { .. }));
    assert_eq!(tracked_paths(&mut repo), [".memignore", "a.txt"]);
    assert!(dir.path().join("loose.txt").exists());
}

#[test]
fn remove_keeps_file_unless_unlinked() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();

    repo.remove(Path::new("a.txt"), false, &quiet()).unwrap();
    assert!(root.join("a.txt").exists());

    let staged = repo
        .remove(Path::new("b.txt"), true, &said("drop b"))
        .unwrap();
    assert!(!root.join("b.txt").exists());
    let snapshot = staged.snapshot.unwrap();
    assert_eq!(snapshot.operation, Operation::Remove);
    let paths: Vec<_> = repo
        .entries_of(Some(&snapshot))
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(paths, [".memignore"]);
}

// ---------------------------------------------------------------
// jump
// ---------------------------------------------------------------

#[test]
fn jump_refuses_dirty_tree() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "a.txt", "v2");
    repo.snapshot(&said("edit"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    write(root, "a.txt", "unsaved");

    match repo.jump("1") {
        Err(MemError::DirtyWorkingTree { paths }) => assert_eq!(paths, ["a.txt"]),
        other => panic!("expected dirty tree, got {other:?}"),
    }
    assert_eq!(read(root, "a.txt"), "unsaved");
}

#[test]
fn jump_refuses_staged_changes() {
    let (dir, mut repo) = project();
    first_snapshot(&mut repo);
    write(dir.path(), "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();
    assert!(matches!(
        repo.jump("1"),
        Err(MemError::DirtyWorkingTree { .. })
    ));
}

#[test]
fn jump_removes_files_absent_from_target() {
    let (dir, mut repo) = project();
    let root = dir.path();
    let first = first_snapshot(&mut repo);
    write(root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();
    let second = repo
        .snapshot(&said("add b"), Operation::Snap, false)
        .unwrap()
        .unwrap();

    repo.jump(&first.commit_id.to_string()[..7]).unwrap();
    assert!(!root.join("b.txt").exists());
    assert_eq!(tracked_paths(&mut repo), [".memignore", "a.txt"]);
    assert_eq!(
        repo.current_snapshot().unwrap().map(|s| s.commit_id),
        Some(first.commit_id)
    );

    repo.jump("2").unwrap();
    assert_eq!(read(root, "b.txt"), "b");
    assert_eq!(
        repo.jump("2").unwrap(),
        Jump::AlreadyCurrent(second)
    );
}

#[test]
fn snap_after_jump_extends_latest() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "a.txt", "v2");
    let second = repo
        .snapshot(&said("edit"), Operation::Snap, false)
        .unwrap()
        .unwrap();

    repo.jump("1").unwrap();
    write(root, "a.txt", "v3");
    let third = repo
        .snapshot(&said("branch off"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    assert_eq!(third.prompt_id, 3);
    assert_eq!(third.parent_commit_id, Some(second.commit_id));
    assert_eq!(repo.history().unwrap().len(), 3);
}

#[test]
fn jump_to_unknown_reference() {
    let (_dir, mut repo) = project();
    first_snapshot(&mut repo);
    assert!(matches!(repo.jump("42"), Err(MemError::NotFound { .. })));
}

#[test]
fn jump_keeps_untracked_file_in_the_way() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "b.txt", "old b");
    repo.track(&[PathBuf::from("b.txt")], &said("add b")).unwrap();
    repo.remove(Path::new("b.txt"), false, &said("stop tracking b"))
        .unwrap();
    write(root, "b.txt", "precious untracked work");
    let current = repo.current_snapshot().unwrap();

    match repo.jump("2") {
        Err(MemError::DirtyWorkingTree { paths }) => assert_eq!(paths, ["b.txt"]),
        other => panic!("expected dirty tree, got {other:?}"),
    }
    assert_eq!(read(root, "b.txt"), "precious untracked work");
    assert_eq!(repo.current_snapshot().unwrap(), current);
    assert_eq!(tracked_paths(&mut repo), [".memignore", "a.txt"]);
}

#[test]
fn jump_over_identical_untracked_file() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    write(root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &said("add b")).unwrap();
    repo.remove(Path::new("b.txt"), false, &said("stop tracking b"))
        .unwrap();

    repo.jump("2").unwrap();
    assert_eq!(read(root, "b.txt"), "b");
    assert!(tracked_paths(&mut repo).contains(&"b.txt".to_string()));
}

// ---------------------------------------------------------------
// amend
// ---------------------------------------------------------------

#[test]
fn amend_replaces_only_given_fields() {
    let (_dir, mut repo) = project();
    let root = repo.root().to_path_buf();
    write(&root, "a.txt", "v1");
    repo.track(&[PathBuf::from("a.txt")], &quiet()).unwrap();
    let first = repo
        .snapshot(
            &Turn::new(Some("old prompt".into()), Some("kept".into()), Source::User),
            Operation::Snap,
            false,
        )
        .unwrap()
        .unwrap();

    let updated = match repo.amend("1", Some("new prompt".into()), None).unwrap() {
        Amended::Updated(s) => s,
        other => panic!("expected update, got {other:?}"),
    };
    assert_eq!(updated.commit_id, first.commit_id);
    assert_eq!(updated.prompt.as_deref(), Some("new prompt"));
    assert_eq!(updated.response.as_deref(), Some("kept"));
    assert_eq!(updated.source, Source::User);

    let stored = repo.resolve("1").unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.tree_id, first.tree_id);
}

#[test]
fn amend_twice_is_idempotent() {
    let (_dir, mut repo) = project();
    first_snapshot(&mut repo);
    repo.amend("1", None, Some("answer".into())).unwrap();
    let again = repo.amend("1", None, Some("answer".into())).unwrap();
    assert!(matches!(again, Amended::Unchanged(ref s) if s.response.as_deref() == Some("answer")));
}

#[test]
fn amend_needs_a_field() {
    let (_dir, mut repo) = project();
    first_snapshot(&mut repo);
    assert!(matches!(
        repo.amend("1", None, None),
        Err(MemError::NothingToAmend)
    ));
}

// ---------------------------------------------------------------
// concurrency and failure atomicity
// ---------------------------------------------------------------

#[test]
fn foreign_commit_is_detected() {
    let (dir, mut repo) = project();
    let first = first_snapshot(&mut repo);

    let raw = git2::Repository::open_bare(dir.path().join(".mem/memov.git")).unwrap();
    let parent = raw.find_commit(first.commit_id).unwrap();
    let tree = parent.tree().unwrap();
    let sig = git2::Signature::now("racer", "racer@localhost").unwrap();
    raw.commit(
        Some("refs/memov/latest"),
        &sig,
        &sig,
        "racer",
        &tree,
        &[&parent],
    )
    .unwrap();

    write(dir.path(), "a.txt", "v2");
    let err = repo
        .snapshot(&said("edit"), Operation::Snap, false)
        .unwrap_err();
    assert!(matches!(err, MemError::ConcurrentModification { .. }));
    assert_eq!(err.exit_code(), 75);
}

/// Delegates to a real substrate, failing the named step.
struct FaultySubstrate {
    inner: GitSubstrate,
    fail: &'static str,
}

impl FaultySubstrate {
    fn check(&self, step: &'static str) -> Result<()> {
        if self.fail == step {
            Err(MemError::substrate(step, git2::Error::from_str("injected")))
        } else {
            Ok(())
        }
    }
}

impl Substrate for FaultySubstrate {
    fn hash_object(&self, bytes: &[u8]) -> Result<Oid> {
        self.inner.hash_object(bytes)
    }
    fn write_object(&self, bytes: &[u8]) -> Result<Oid> {
        self.check("write_object")?;
        self.inner.write_object(bytes)
    }
    fn build_tree(&self, entries: &[TreeEntry]) -> Result<Oid> {
        self.check("build_tree")?;
        self.inner.build_tree(entries)
    }
    fn tree_entries(&self, tree_id: Oid) -> Result<Vec<TreeEntry>> {
        self.inner.tree_entries(tree_id)
    }
    fn create_commit(&self, tree_id: Oid, parent: Option<Oid>, message: &str) -> Result<Oid> {
        self.check("create_commit")?;
        self.inner.create_commit(tree_id, parent, message)
    }
    fn read_commit(&self, commit_id: Oid) -> Result<CommitInfo> {
        self.inner.read_commit(commit_id)
    }
    fn attach_metadata(&self, commit_id: Oid, metadata: &Metadata) -> Result<()> {
        self.check("attach_metadata")?;
        self.inner.attach_metadata(commit_id, metadata)
    }
    fn read_metadata(&self, commit_id: Oid) -> Result<Option<Metadata>> {
        self.inner.read_metadata(commit_id)
    }
    fn detach_metadata(&self, commit_id: Oid) -> Result<()> {
        self.inner.detach_metadata(commit_id)
    }
    fn latest_commit_id(&self) -> Result<Option<Oid>> {
        self.inner.latest_commit_id()
    }
    fn advance_latest(&self, expected: Option<Oid>, new: Oid) -> Result<()> {
        self.check("advance_latest")?;
        self.inner.advance_latest(expected, new)
    }
    fn current_commit_id(&self) -> Result<Option<Oid>> {
        self.inner.current_commit_id()
    }
    fn set_current(&self, commit_id: Oid) -> Result<()> {
        self.check("set_current")?;
        self.inner.set_current(commit_id)
    }
    fn checkout(&self, commit_id: Oid) -> Result<()> {
        self.check("checkout")?;
        self.inner.checkout(commit_id)
    }
    fn diff(&self, from: Option<Oid>, to: Oid) -> Result<Vec<FileChange>> {
        self.inner.diff(from, to)
    }
}

fn reopen_faulty(root: &Path, fail: &'static str) -> Repo<FaultySubstrate> {
    let inner = GitSubstrate::open(&root.join(".mem/memov.git"), root).unwrap();
    Repo::with_substrate(root, FaultySubstrate { inner, fail }).unwrap()
}

#[test]
fn failed_snapshot_steps_leave_history_and_status_alone() {
    for step in [
        "write_object",
        "build_tree",
        "create_commit",
        "attach_metadata",
        "set_current",
        "advance_latest",
    ] {
        let (dir, mut repo) = project();
        let root = dir.path().to_path_buf();
        let first = first_snapshot(&mut repo);
        drop(repo);

        write(&root, "a.txt", "v2");
        let mut faulty = reopen_faulty(&root, step);
        let status_before = faulty.status().unwrap();

        let err = faulty
            .snapshot(&said("edit"), Operation::Snap, false)
            .unwrap_err();
        assert!(matches!(err, MemError::Substrate { .. }), "{step}: {err}");

        let history = faulty.history().unwrap();
        assert_eq!(history.len(), 1, "{step}");
        assert_eq!(history.tip(), Some(first.commit_id), "{step}");
        let status_after = faulty.status().unwrap();
        assert_eq!(status_after.tracked, status_before.tracked, "{step}");
        assert_eq!(
            faulty.current_snapshot().unwrap().map(|s| s.commit_id),
            Some(first.commit_id),
            "{step}"
        );
    }
}

#[test]
fn failed_checkout_keeps_current_pointer() {
    let (dir, mut repo) = project();
    let root = dir.path().to_path_buf();
    first_snapshot(&mut repo);
    write(&root, "a.txt", "v2");
    let second = repo
        .snapshot(&said("edit"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    drop(repo);

    let mut faulty = reopen_faulty(&root, "checkout");
    assert!(faulty.jump("1").is_err());
    assert_eq!(
        faulty.current_snapshot().unwrap().map(|s| s.commit_id),
        Some(second.commit_id)
    );
    assert_eq!(read(&root, "a.txt"), "v2");
    assert_eq!(faulty.history().unwrap().len(), 2);
}

#[test]
fn failed_jump_restores_deleted_files() {
    let (dir, mut repo) = project();
    let root = dir.path().to_path_buf();
    first_snapshot(&mut repo);
    write(&root, "a.txt", "v2");
    write(&root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &quiet()).unwrap();
    let second = repo
        .snapshot(&said("edit a, add b"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    drop(repo);

    let mut faulty = reopen_faulty(&root, "set_current");
    let err = faulty.jump("1").unwrap_err();
    assert!(matches!(err, MemError::Substrate { .. }), "{err}");

    assert_eq!(read(&root, "a.txt"), "v2");
    assert_eq!(read(&root, "b.txt"), "b");
    assert!(faulty.tracked_set().unwrap().contains("b.txt"));
    assert!(faulty.status().unwrap().is_clean());
    assert_eq!(
        faulty.current_snapshot().unwrap().map(|s| s.commit_id),
        Some(second.commit_id)
    );
}

#[test]
fn failed_jump_removes_files_it_wrote() {
    let (dir, mut repo) = project();
    let root = dir.path().to_path_buf();
    let first = first_snapshot(&mut repo);
    write(&root, "b.txt", "b");
    repo.track(&[PathBuf::from("b.txt")], &said("add b")).unwrap();
    repo.jump("1").unwrap();
    drop(repo);

    let mut faulty = reopen_faulty(&root, "set_current");
    assert!(faulty.jump("2").is_err());
    assert!(!root.join("b.txt").exists());
    assert!(!faulty.tracked_set().unwrap().contains("b.txt"));
    assert!(faulty.status().unwrap().is_clean());
    assert_eq!(
        faulty.current_snapshot().unwrap().map(|s| s.commit_id),
        Some(first.commit_id)
    );
}

#[test]
fn snapshot_stands_once_latest_has_moved() {
    let (dir, mut repo) = project();
    let root = dir.path();
    first_snapshot(&mut repo);
    // A directory where the tracked set's temporary file goes makes saving fail.
    fs::create_dir_all(root.join(MEM_DIR).join("tracked.json.tmp")).unwrap();
    write(root, "a.txt", "v2");

    let second = repo
        .snapshot(&said("edit"), Operation::Snap, false)
        .unwrap()
        .unwrap();
    assert_eq!(second.prompt_id, 2);
    assert_eq!(repo.history().unwrap().len(), 2);
    assert_eq!(
        repo.current_snapshot().unwrap().map(|s| s.commit_id),
        Some(second.commit_id)
    );
    assert!(repo.status().unwrap().is_clean());
}
