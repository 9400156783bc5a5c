//! On-disk layout of a project and its ledger file.
//!
//! The ledger is a JSON array of history entries, rewritten in full through a
//! temp file and rename on every mutation. A reader therefore sees either the
//! previous or the next complete ledger, never a partial one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::invariants::validate_history;
use crate::core::types::HistoryEntry;

pub const LEDGER_FILE: &str = "history.json";
pub const SUBMISSION_FILE: &str = "submission.pdf";

/// Paths owned by one project under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub dir: PathBuf,
    pub ledger: PathBuf,
    pub submission: PathBuf,
}

impl ProjectPaths {
    pub fn new(data_dir: &Path, project_id: &str) -> Self {
        let dir = data_dir.join(project_id);
        Self {
            ledger: dir.join(LEDGER_FILE),
            submission: dir.join(SUBMISSION_FILE),
            dir,
        }
    }
}

/// Load and check a ledger. A missing file is an empty history.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    if !path.exists() {
        debug!("ledger missing, starting empty");
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let entries: Vec<HistoryEntry> =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let problems = validate_history(&entries);
    if !problems.is_empty() {
        return Err(anyhow!(
            "ledger {} is inconsistent: {}",
            path.display(),
            problems.join("; ")
        ));
    }
    debug!(entries = entries.len(), "ledger loaded");
    Ok(entries)
}

/// Replace the ledger with `entries`.
pub fn write_history(path: &Path, entries: &[HistoryEntry]) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(entries).context("serialize ledger")?;
    contents.push('\n');
    write_atomic(path, &contents)
}

/// Store the uploaded submission next to the ledger.
pub fn write_submission(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("submission path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("ledger path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp ledger {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace ledger {}", path.display()))?;
    Ok(())
}
