//! In-memory ledger state machine.
//!
//! `History` owns the ordered entries and enforces the iteration lifecycle
//! (open -> committed). It performs no I/O: persistence and version control
//! are layered on top by [`crate::project::Project`], which mutates a clone
//! and only swaps it in once the ledger file has been written.

use crate::core::types::{HistoryEntry, Iteration, StatusEvent, StatusUpdate};
use crate::error::LedgerError;

/// What `commit_latest` has to do for the tail iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPlan {
    /// Tail iteration is open; a new checkpoint must be taken.
    Checkpoint,
    /// Tail iteration is already sealed with this id.
    AlreadyCommitted(String),
}

/// Entries dropped by a rollback, plus the checkpoint they were sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackPlan {
    /// Position of the most recently committed iteration.
    pub position: usize,
    pub commit_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tail iteration if it is still accepting events.
    pub fn open_iteration(&self) -> Option<&Iteration> {
        match self.entries.last() {
            Some(HistoryEntry::Iteration(iteration)) if iteration.is_open() => Some(iteration),
            _ => None,
        }
    }

    pub fn add_prompt(&mut self, text: impl Into<String>) -> Result<(), LedgerError> {
        if self.open_iteration().is_some() {
            return Err(LedgerError::IterationOpen);
        }
        self.entries.push(HistoryEntry::Prompt(text.into()));
        Ok(())
    }

    /// Append a status event, opening a new iteration when the tail is not an
    /// open one. Returns the stored event with its assigned index.
    pub fn add_status(&mut self, update: StatusUpdate) -> StatusEvent {
        if self.open_iteration().is_none() {
            self.entries
                .push(HistoryEntry::Iteration(Iteration::default()));
        }
        let mut event = StatusEvent {
            stage: update.stage,
            message: update.message,
            zip_result: update.zip_result,
            preview: update.preview,
            index: 0,
        };
        if let Some(HistoryEntry::Iteration(iteration)) = self.entries.last_mut() {
            event.index = iteration.next_index();
            iteration.events.push(event.clone());
        }
        event
    }

    /// Decide whether the tail iteration needs a checkpoint.
    pub fn plan_commit(&self) -> Result<CommitPlan, LedgerError> {
        match self.entries.last() {
            Some(HistoryEntry::Iteration(iteration)) => match &iteration.commit_id {
                Some(id) => Ok(CommitPlan::AlreadyCommitted(id.clone())),
                None => Ok(CommitPlan::Checkpoint),
            },
            _ => Err(LedgerError::NoOpenIteration),
        }
    }

    /// Seal the tail iteration with `commit_id`.
    ///
    /// A sealed iteration keeps its original id; the stored id is returned.
    pub fn seal_latest(&mut self, commit_id: impl Into<String>) -> Result<String, LedgerError> {
        match self.entries.last_mut() {
            Some(HistoryEntry::Iteration(iteration)) => {
                let stored = iteration.commit_id.get_or_insert_with(|| commit_id.into());
                Ok(stored.clone())
            }
            _ => Err(LedgerError::NoOpenIteration),
        }
    }

    /// Locate the most recently committed iteration.
    pub fn plan_rollback(&self) -> Result<RollbackPlan, LedgerError> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find_map(|(position, entry)| {
                let commit_id = entry.as_iteration()?.commit_id.clone()?;
                Some(RollbackPlan {
                    position,
                    commit_id,
                })
            })
            .ok_or(LedgerError::NoCommitToRollback)
    }

    /// Drop the entry at `position` and everything after it.
    pub fn truncate_from(&mut self, position: usize) -> Vec<HistoryEntry> {
        if position >= self.entries.len() {
            return Vec::new();
        }
        self.entries.split_off(position)
    }
}
