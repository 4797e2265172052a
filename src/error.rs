use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemError>;

/// Boxed cause carried by [`MemError::Substrate`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MemError {
    #[error("no memov repository at {} (run `mem init` first)", root.display())]
    NotInitialized { root: PathBuf },

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("path is not tracked: {path}")]
    NotTracked { path: String },

    #[error("reference `{reference}` is ambiguous, it matches {}", candidates.join(", "))]
    AmbiguousReference {
        reference: String,
        candidates: Vec<String>,
    },

    #[error(
        "working tree has uncommitted changes ({}); snapshot or discard them first",
        paths.join(", ")
    )]
    DirtyWorkingTree { paths: Vec<String> },

    #[error("history was modified concurrently ({detail}); retry the command")]
    ConcurrentModification { detail: String },

    #[error("failed to stage {path}: {source}")]
    Staging {
        path: String,
        source: std::io::Error,
    },

    #[error("substrate operation `{operation}` failed: {source}")]
    Substrate {
        operation: &'static str,
        source: Cause,
    },

    #[error("{path} already exists")]
    PathConflict { path: String },

    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("nothing to amend: supply a prompt and/or a response")]
    NothingToAmend,

    #[error("configuration error in {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl MemError {
    pub fn substrate(operation: &'static str, source: impl Into<Cause>) -> Self {
        MemError::Substrate {
            operation,
            source: source.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| MemError::Io { path, source }
    }

    pub fn path_not_found(path: impl Into<String>) -> Self {
        MemError::NotFound {
            what: "path",
            name: path.into(),
        }
    }

    pub fn reference_not_found(reference: impl Into<String>) -> Self {
        MemError::NotFound {
            what: "reference",
            name: reference.into(),
        }
    }

    /// Taxonomy name shown to the user.
    pub fn kind(&self) -> &'static str {
        match self {
            MemError::NotInitialized { .. } => "NotInitializedError",
            MemError::NotFound { .. } => "NotFoundError",
            MemError::NotTracked { .. } => "NotTrackedError",
            MemError::AmbiguousReference { .. } => "AmbiguousReferenceError",
            MemError::DirtyWorkingTree { .. } => "DirtyWorkingTreeError",
            MemError::ConcurrentModification { .. } => "ConcurrentModificationError",
            MemError::Staging { .. } => "StagingError",
            MemError::Substrate { .. } => "SubstrateError",
            MemError::PathConflict { .. } => "PathConflictError",
            MemError::InvalidPath { .. } => "InvalidPathError",
            MemError::NothingToAmend => "NothingToAmendError",
            MemError::Config { .. } => "ConfigError",
            MemError::Io { .. } => "IoError",
        }
    }

    /// Process exit status for this error. Only a concurrent modification is
    /// worth retrying.
    pub fn exit_code(&self) -> i32 {
        match self {
            MemError::ConcurrentModification { .. } => 75,
            _ => 2,
        }
    }
}
