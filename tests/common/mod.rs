#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::Command;

/// Run `mem` with `args` from `cwd`; returns (exit code, stdout, stderr).
pub fn run_cli(cwd: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_mem"))
        .args(args)
        .current_dir(cwd)
        .env_remove("MEMOV_LOG")
        .output()
        .expect("failed to spawn binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Like [`run_cli`] but fails the test on a non-zero exit. Returns stdout.
pub fn mem(cwd: &Path, args: &[&str]) -> String {
    let (code, stdout, stderr) = run_cli(cwd, args);
    assert_eq!(code, 0, "mem {args:?} failed\nstdout: {stdout}\nstderr: {stderr}");
    stdout
}

/// Temp project with `mem init` already run. The `TempDir` must be kept
/// alive for the duration of the test.
pub fn temp_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    mem(dir.path(), &["init"]);
    dir
}

pub fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

/// The substrate repository, opened directly.
pub fn substrate(root: &Path) -> git2::Repository {
    git2::Repository::open_bare(root.join(".mem/memov.git")).unwrap()
}

/// Commit id `refs/memov/latest` points at.
pub fn latest(root: &Path) -> Option<git2::Oid> {
    substrate(root)
        .find_reference("refs/memov/latest")
        .ok()
        .and_then(|r| r.target())
}

/// Metadata note attached to `commit`, parsed as JSON.
pub fn note(root: &Path, commit: git2::Oid) -> Option<serde_json::Value> {
    let repo = substrate(root);
    let note = repo.find_note(Some("refs/notes/memov"), commit).ok()?;
    serde_json::from_str(note.message()?).ok()
}
