//! The set of project paths under version, and the helpers that map
//! user-supplied paths onto it.

use crate::error::{MemError, Result};
use crate::metadata::TrackedFile;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const MEM_DIR: &str = ".mem";
pub const IGNORE_FILE: &str = ".memignore";

/// Ordered set of `/`-separated paths relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSet {
    paths: BTreeSet<String>,
}

impl TrackedSet {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Read `tracked.json`. `None` when it has never been written.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(s) => {
                let file: TrackedFile = serde_json::from_str(&s).map_err(|e| MemError::Config {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
                Ok(Some(Self::from_paths(file.paths)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MemError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Write `tracked.json` through a temporary file so a crash never leaves
    /// it half written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = TrackedFile {
            paths: self.paths.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| MemError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(MemError::io(&tmp))?;
        fs::rename(&tmp, path).map_err(MemError::io(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Returns whether the path was newly inserted.
    pub fn add(&mut self, path: String) -> bool {
        self.paths.insert(path)
    }

    pub fn remove(&mut self, path: &str) -> Result<()> {
        if self.paths.remove(path) {
            Ok(())
        } else {
            Err(MemError::NotTracked { path: path.into() })
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.paths.contains(old) {
            return Err(MemError::NotTracked { path: old.into() });
        }
        if self.paths.contains(new) {
            return Err(MemError::PathConflict { path: new.into() });
        }
        self.paths.remove(old);
        self.paths.insert(new.into());
        Ok(())
    }
}

/// Map `path` (absolute, or relative to `root`) to its tracked form.
///
/// Purely lexical so that paths which no longer exist on disk, such as a
/// rename source already moved by the user, still resolve.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let normalized = normalize(&joined);
    let rel = normalized
        .strip_prefix(normalize(root))
        .map_err(|_| MemError::InvalidPath {
            path: path.to_path_buf(),
            reason: "outside the project root",
        })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(MemError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "not a plain relative path",
                });
            }
        }
    }
    if parts.is_empty() {
        return Err(MemError::InvalidPath {
            path: path.to_path_buf(),
            reason: "names the project root itself",
        });
    }
    if parts[0] == MEM_DIR {
        return Err(MemError::InvalidPath {
            path: path.to_path_buf(),
            reason: "inside the memov state directory",
        });
    }
    Ok(parts.join("/"))
}

/// Resolve `.` and `..` lexically.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Every file under `dir` that `.memignore` does not exclude, as tracked
/// paths. `.mem/` is never descended into.
///
/// The walk always starts at `root` so the root `.memignore` applies to
/// subdirectories too; ignore files above the root are never read. Entries
/// that cannot be read are logged and skipped.
pub fn walk_files(root: &Path, dir: &Path) -> Result<Vec<String>> {
    let scope = normalize(dir);
    if !scope.starts_with(normalize(root)) {
        return Err(MemError::InvalidPath {
            path: dir.to_path_buf(),
            reason: "outside the project root",
        });
    }
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .parents(false)
        .add_custom_ignore_filename(IGNORE_FILE)
        .follow_links(false)
        .filter_entry(move |entry| {
            let name = entry.file_name();
            if entry.depth() > 0 && (name == MEM_DIR || name == ".git") {
                return false;
            }
            let path = entry.path();
            scope.starts_with(path) || path.starts_with(&scope)
        })
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_some_and(|t| t.is_file()) {
            files.push(relative_path(root, entry.path())?);
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `.memignore` at the project root excludes `rel`.
pub fn is_ignored(root: &Path, rel: &str) -> bool {
    let mut builder = ignore::gitignore::GitignoreBuilder::new(root);
    if builder.add(root.join(IGNORE_FILE)).is_some() {
        debug!("no readable {IGNORE_FILE}");
    }
    match builder.build() {
        Ok(matcher) => matcher
            .matched_path_or_any_parents(rel, false)
            .is_ignore(),
        Err(_) => false,
    }
}
