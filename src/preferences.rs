use crate::error::{MemError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const FILENAME: &str = "memov.toml";

const DEFAULT_TEMPLATE: &str =
    "{{ operation }} #{{ prompt_id }}{% if prompt %}: {{ prompt }}{% endif %}";

/// Commit message template: either an inline Jinja2 string or a path to a
/// template file (relative to `.mem/`).
///
/// In TOML this looks like one of:
///
/// ```toml
/// [commit_template]
/// inline = "{{ operation }}: {{ prompt }}"
///
/// # or
///
/// [commit_template]
/// file = "commit.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CommitTemplate {
    Inline(String),
    File(String),
}

impl Default for CommitTemplate {
    fn default() -> Self {
        CommitTemplate::Inline(DEFAULT_TEMPLATE.into())
    }
}

/// User-facing preferences stored in `.mem/memov.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    /// Whether `snap` records a snapshot even when nothing changed and no
    /// prompt or response was given.
    #[serde(default = "default_snap_allow_empty")]
    pub snap_allow_empty: bool,

    /// Characters of prompt/response shown per row by `history`.
    #[serde(default = "default_history_width")]
    pub history_width: usize,

    /// Template for the substrate commit message.
    #[serde(default)]
    pub commit_template: CommitTemplate,
}

fn default_snap_allow_empty() -> bool {
    true
}

fn default_history_width() -> usize {
    15
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            snap_allow_empty: default_snap_allow_empty(),
            history_width: default_history_width(),
            commit_template: CommitTemplate::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from `.mem/memov.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| MemError::Config {
                path,
                detail: e.to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str = toml::to_string_pretty(&prefs).map_err(|e| MemError::Config {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
                fs::write(&path, toml_str).map_err(MemError::io(&path))?;
                Ok(prefs)
            }
            Err(e) => Err(MemError::Io { path, source: e }),
        }
    }

    /// Resolve the commit message template to a string.
    pub fn commit_template(&self, dir: &Path) -> Result<String> {
        match &self.commit_template {
            CommitTemplate::Inline(s) => Ok(s.clone()),
            CommitTemplate::File(filename) => {
                let path = dir.join(filename);
                fs::read_to_string(&path).map_err(MemError::io(path))
            }
        }
    }
}
