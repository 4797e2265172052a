//! JSON export of the whole prompt history with per-snapshot diffs.

use crate::history::SnapshotDetail;
use crate::repo::Repo;
use crate::substrate::Substrate;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const DEFAULT_FILENAME: &str = "trace.json";

#[derive(Debug, Serialize)]
pub struct TraceRecord {
    #[serde(flatten)]
    pub detail: SnapshotDetail,
    pub recorded_at: String,
}

/// RFC 3339 in UTC. Falls back to the raw seconds for out-of-range values.
pub fn format_timestamp(seconds: i64) -> String {
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| seconds.to_string())
}

/// Every snapshot, oldest first, with its changes against the parent.
pub fn collect<S: Substrate>(repo: &mut Repo<S>) -> Result<Vec<TraceRecord>> {
    let history = repo.history()?;
    let mut records = Vec::with_capacity(history.len());
    for snapshot in history.iter() {
        let detail = repo
            .show(&snapshot.commit_id.to_string())
            .with_context(|| format!("diffing snapshot #{}", snapshot.prompt_id))?;
        records.push(TraceRecord {
            recorded_at: format_timestamp(snapshot.timestamp),
            detail,
        });
    }
    Ok(records)
}

/// Write the trace to `output` and return how many snapshots it holds.
pub fn export<S: Substrate>(repo: &mut Repo<S>, output: &Path) -> Result<usize> {
    let records = collect(repo)?;
    let json = serde_json::to_string_pretty(&records).context("serializing trace")?;
    fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
    Ok(records.len())
}
