//! History data model persisted in the project ledger.
//!
//! The ledger file is a JSON array whose elements are either a plain string
//! (a prompt) or an object `{"status_list": [...], "commit_id": ...}` (an
//! iteration). The JSON shape is the variant tag, so `HistoryEntry` is
//! untagged and round-trips without any extra discriminator.

use serde::{Deserialize, Serialize};

/// One element of a project's ordered history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    /// Free-text note, e.g. the initial submission or a follow-up request.
    Prompt(String),
    Iteration(Iteration),
}

impl HistoryEntry {
    pub fn as_iteration(&self) -> Option<&Iteration> {
        match self {
            HistoryEntry::Iteration(iteration) => Some(iteration),
            HistoryEntry::Prompt(_) => None,
        }
    }

    pub fn as_prompt(&self) -> Option<&str> {
        match self {
            HistoryEntry::Prompt(text) => Some(text),
            HistoryEntry::Iteration(_) => None,
        }
    }
}

/// One unit of agent work.
///
/// Open while `commit_id` is `None`; sealed once a checkpoint id is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    #[serde(rename = "status_list")]
    pub events: Vec<StatusEvent>,
    #[serde(default)]
    pub commit_id: Option<String>,
}

impl Iteration {
    pub fn is_open(&self) -> bool {
        self.commit_id.is_none()
    }

    /// Index the next appended event will receive; saturates at `u32::MAX`.
    pub fn next_index(&self) -> u32 {
        u32::try_from(self.events.len()).unwrap_or(u32::MAX)
    }
}

/// A progress report appended to an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub stage: String,
    pub message: String,
    pub zip_result: Option<String>,
    pub preview: Option<String>,
    /// Zero-based position within the owning iteration.
    pub index: u32,
}

/// Caller-supplied fields of a status event; the ledger assigns `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub stage: String,
    pub message: String,
    pub zip_result: Option<String>,
    pub preview: Option<String>,
}

impl StatusUpdate {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            zip_result: None,
            preview: None,
        }
    }

    pub fn with_zip_result(mut self, zip_result: impl Into<String>) -> Self {
        self.zip_result = Some(zip_result.into());
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }
}
