use crate::substrate::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_PROMPT_ID: &str = "prompt_id";
const KEY_OPERATION: &str = "operation";
const KEY_SOURCE: &str = "source";
const KEY_PROMPT: &str = "prompt";
const KEY_RESPONSE: &str = "response";

/// Which command recorded a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Track,
    Snap,
    Rename,
    Remove,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Track => "track",
            Operation::Snap => "snap",
            Operation::Rename => "rename",
            Operation::Remove => "remove",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "track" => Some(Operation::Track),
            "snap" => Some(Operation::Snap),
            "rename" => Some(Operation::Rename),
            "remove" => Some(Operation::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced the change: the assistant or the user by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Ai,
    User,
}

impl Source {
    pub fn from_by_user(by_user: bool) -> Self {
        if by_user { Source::User } else { Source::Ai }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Ai => "ai",
            Source::User => "user",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt/response record attached to a snapshot commit.
/// Stored in the substrate's metadata side table under `refs/notes/memov`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMetadata {
    pub prompt_id: u64,
    pub operation: Operation,
    pub source: Source,
    pub prompt: Option<String>,
    pub response: Option<String>,
}

impl SnapshotMetadata {
    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert(KEY_PROMPT_ID.into(), self.prompt_id.to_string());
        map.insert(KEY_OPERATION.into(), self.operation.as_str().into());
        map.insert(KEY_SOURCE.into(), self.source.as_str().into());
        if let Some(prompt) = &self.prompt {
            map.insert(KEY_PROMPT.into(), prompt.clone());
        }
        if let Some(response) = &self.response {
            map.insert(KEY_RESPONSE.into(), response.clone());
        }
        map
    }

    /// `None` when the map does not have the shape memov writes.
    pub fn from_map(map: &Metadata) -> Option<Self> {
        let prompt_id = map.get(KEY_PROMPT_ID)?.parse().ok()?;
        let operation = Operation::parse(map.get(KEY_OPERATION)?)?;
        let source = match map.get(KEY_SOURCE).map(String::as_str) {
            Some("user") => Source::User,
            _ => Source::Ai,
        };
        Some(Self {
            prompt_id,
            operation,
            source,
            prompt: map.get(KEY_PROMPT).cloned(),
            response: map.get(KEY_RESPONSE).cloned(),
        })
    }

    pub fn has_text(&self) -> bool {
        self.prompt.is_some() || self.response.is_some()
    }
}

/// Staged TrackedSet, persisted as `.mem/tracked.json` between commands.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrackedFile {
    pub paths: Vec<String>,
}
