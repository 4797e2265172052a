mod common;

use common::{latest, mem, read, run_cli, temp_project, write};

#[test]
fn commands_need_init() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_cli(dir.path(), &["history"]);
    assert_eq!(code, 2);
    assert!(stdout.is_empty());
    assert!(stderr.contains("NotInitializedError"), "{stderr}");
}

#[test]
fn rejects_unknown_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["bogus"]);
    assert_ne!(code, 0);
}

#[test]
fn dirty_tree_blocks_jump() {
    let project = temp_project();
    let root = project.path();
    write(root, "a.txt", "v1");
    mem(root, &["track", "a.txt", "-p", "one"]);
    write(root, "a.txt", "v2");
    mem(root, &["snap", "-p", "two"]);
    write(root, "a.txt", "unsaved");

    let (code, _, stderr) = run_cli(root, &["jump", "1"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("DirtyWorkingTreeError"), "{stderr}");
    assert!(stderr.contains("a.txt"));
    assert_eq!(read(root, "a.txt"), "unsaved");
}

#[test]
fn unknown_reference() {
    let project = temp_project();
    let root = project.path();
    write(root, "a.txt", "v1");
    mem(root, &["track", "a.txt", "-p", "one"]);

    let (code, _, stderr) = run_cli(root, &["show", "99"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("NotFoundError"), "{stderr}");
}

#[test]
fn removing_untracked_path() {
    let project = temp_project();
    let root = project.path();
    write(root, "loose.txt", "x");
    let (code, _, stderr) = run_cli(root, &["remove", "-u", "loose.txt"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("NotTrackedError"), "{stderr}");
    assert!(root.join("loose.txt").exists());
}

#[test]
fn tracking_missing_file() {
    let project = temp_project();
    let (code, _, stderr) = run_cli(project.path(), &["track", "ghost.txt"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("NotFoundError"), "{stderr}");
}

#[test]
fn amend_without_fields() {
    let project = temp_project();
    let root = project.path();
    write(root, "a.txt", "v1");
    mem(root, &["track", "a.txt", "-p", "one"]);
    let (code, _, stderr) = run_cli(root, &["amend", "1"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("NothingToAmendError"), "{stderr}");
}

#[test]
fn held_lock_is_a_retryable_conflict() {
    use fs2::FileExt;

    let project = temp_project();
    let root = project.path();
    let lock = std::fs::File::open(root.join(".mem/LOCK")).unwrap();
    lock.lock_exclusive().unwrap();

    let (code, _, stderr) = run_cli(root, &["status"]);
    assert_eq!(code, 75);
    assert!(stderr.contains("ConcurrentModificationError"), "{stderr}");

    FileExt::unlock(&lock).unwrap();
    mem(root, &["status"]);
}

#[test]
fn snapshot_with_missing_file_records_nothing() {
    let project = temp_project();
    let root = project.path();
    write(root, "a.txt", "v1");
    mem(root, &["track", "a.txt", "-p", "one"]);
    let tip = latest(root);
    std::fs::remove_file(root.join("a.txt")).unwrap();

    let (code, _, stderr) = run_cli(root, &["snap", "-p", "two"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("StagingError"), "{stderr}");
    assert_eq!(latest(root), tip);
}
