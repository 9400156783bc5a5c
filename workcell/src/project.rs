//! The project aggregate: history ledger, its file, and the code checkpoints.
//!
//! Every mutation runs on a clone of the in-memory history, persists the
//! clone, and only then swaps it in. A failed write leaves memory equal to
//! the last durable ledger; version-control side effects of the failed
//! operation are compensated before the error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::core::history::{CommitPlan, History};
use crate::core::types::{HistoryEntry, StatusEvent, StatusUpdate};
use crate::error::LedgerError;
use crate::io::git::{ResetMode, VersionControl};
use crate::io::ledger_store::{ProjectPaths, load_history, write_history};

/// Result of a successful rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Checkpoint that was undone.
    pub reverted_commit: String,
    /// Entries removed from the tail of history, oldest first.
    pub removed: Vec<HistoryEntry>,
}

pub struct Project {
    id: String,
    code_dir: PathBuf,
    paths: ProjectPaths,
    history: History,
    vcs: Arc<dyn VersionControl>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("code_dir", &self.code_dir)
            .field("paths", &self.paths)
            .field("entries", &self.history.len())
            .finish()
    }
}

impl Project {
    /// Start a new project with an empty, persisted ledger.
    #[instrument(skip_all, fields(project_id = id))]
    pub fn create(
        id: &str,
        paths: ProjectPaths,
        code_dir: impl Into<PathBuf>,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self, LedgerError> {
        let project = Self {
            id: id.to_string(),
            code_dir: code_dir.into(),
            paths,
            history: History::new(),
            vcs,
        };
        project
            .vcs
            .ensure_initialized(&project.code_dir)
            .map_err(LedgerError::vcs)?;
        project.persist(&project.history)?;
        info!("project created");
        Ok(project)
    }

    /// Reopen a project from its ledger file.
    #[instrument(skip_all, fields(project_id = id))]
    pub fn load(
        id: &str,
        paths: ProjectPaths,
        code_dir: impl Into<PathBuf>,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self, LedgerError> {
        let entries = load_history(&paths.ledger).map_err(|reason| LedgerError::Persistence {
            path: paths.ledger.clone(),
            reason,
        })?;
        let project = Self {
            id: id.to_string(),
            code_dir: code_dir.into(),
            paths,
            history: History::from_entries(entries),
            vcs,
        };
        project
            .vcs
            .ensure_initialized(&project.code_dir)
            .map_err(LedgerError::vcs)?;
        info!(entries = project.history.len(), "project loaded");
        Ok(project)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn history(&self) -> &[HistoryEntry] {
        self.history.entries()
    }

    #[instrument(skip_all, fields(project_id = %self.id))]
    pub fn add_prompt(&mut self, text: &str) -> Result<(), LedgerError> {
        let mut next = self.history.clone();
        next.add_prompt(text)?;
        self.persist(&next)?;
        self.history = next;
        Ok(())
    }

    #[instrument(skip_all, fields(project_id = %self.id, stage = %update.stage))]
    pub fn add_status(&mut self, update: StatusUpdate) -> Result<StatusEvent, LedgerError> {
        let mut next = self.history.clone();
        let event = next.add_status(update);
        self.persist(&next)?;
        self.history = next;
        Ok(event)
    }

    /// Seal the tail iteration with a new checkpoint of the code directory.
    ///
    /// Calling this again on a sealed iteration returns its existing id.
    #[instrument(skip_all, fields(project_id = %self.id))]
    pub fn commit_latest(&mut self) -> Result<String, LedgerError> {
        if let CommitPlan::AlreadyCommitted(existing) = self.history.plan_commit()? {
            info!(commit = %existing, "iteration already committed");
            return Ok(existing);
        }

        let previous = self.vcs.head(&self.code_dir).map_err(LedgerError::vcs)?;
        let message = format!("{}: iteration {}", self.id, self.iteration_count());
        let commit_id = self
            .vcs
            .commit(&self.code_dir, &message)
            .map_err(LedgerError::vcs)?;

        let mut next = self.history.clone();
        let stored = next.seal_latest(commit_id)?;
        if let Err(err) = self.persist(&next) {
            self.compensate(&previous, ResetMode::Soft);
            return Err(err);
        }
        self.history = next;
        info!(commit = %stored, "iteration committed");
        Ok(stored)
    }

    /// Revert the code directory to before the latest committed iteration and
    /// drop that iteration and everything after it.
    #[instrument(skip_all, fields(project_id = %self.id))]
    pub fn rollback(&mut self) -> Result<RollbackOutcome, LedgerError> {
        let plan = self.history.plan_rollback()?;
        let head = self.vcs.head(&self.code_dir).map_err(LedgerError::vcs)?;
        if head != plan.commit_id {
            return Err(LedgerError::vcs(anyhow::anyhow!(
                "working copy is at {head} but the ledger's last commit is {}",
                plan.commit_id
            )));
        }

        self.vcs
            .rollback_to_previous(&self.code_dir)
            .map_err(LedgerError::vcs)?;

        let mut next = self.history.clone();
        let removed = next.truncate_from(plan.position);
        if let Err(err) = self.persist(&next) {
            self.compensate(&head, ResetMode::Hard);
            return Err(err);
        }
        self.history = next;
        info!(commit = %plan.commit_id, removed = removed.len(), "iteration rolled back");
        Ok(RollbackOutcome {
            reverted_commit: plan.commit_id,
            removed,
        })
    }

    fn iteration_count(&self) -> usize {
        self.history
            .entries()
            .iter()
            .filter(|entry| entry.as_iteration().is_some())
            .count()
    }

    fn persist(&self, history: &History) -> Result<(), LedgerError> {
        write_history(&self.paths.ledger, history.entries()).map_err(|reason| {
            warn!(err = %format!("{reason:#}"), "ledger write failed");
            LedgerError::Persistence {
                path: self.paths.ledger.clone(),
                reason,
            }
        })
    }

    fn compensate(&self, checkpoint: &str, mode: ResetMode) {
        match self.vcs.reset_to(&self.code_dir, checkpoint, mode) {
            Ok(()) => warn!(checkpoint, ?mode, "version control restored after failed write"),
            Err(err) => error!(
                checkpoint,
                ?mode,
                err = %format!("{err:#}"),
                "could not restore version control; working copy and ledger disagree"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::Iteration;
    use crate::test_support::ScriptedVcs;

    struct Fixture {
        _temp: tempfile::TempDir,
        vcs: Arc<ScriptedVcs>,
        project: Project,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = Arc::new(ScriptedVcs::new());
        let paths = ProjectPaths::new(&temp.path().join("data"), "proj-1");
        let project =
            Project::create("proj-1", paths, temp.path().join("code"), vcs.clone()).expect("create");
        Fixture {
            _temp: temp,
            vcs,
            project,
        }
    }

    /// Make the next ledger write fail: a directory cannot be renamed over.
    fn break_ledger(project: &Project) {
        fs::remove_file(&project.paths().ledger).expect("remove ledger");
        fs::create_dir(&project.paths().ledger).expect("block ledger");
    }

    fn reload(fx: &Fixture) -> Vec<HistoryEntry> {
        load_history(&fx.project.paths().ledger).expect("reload")
    }

    #[test]
    fn create_persists_empty_ledger_and_baseline() {
        let fx = fixture();
        assert!(fx.project.paths().ledger.exists());
        assert!(reload(&fx).is_empty());
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline"]);
    }

    #[test]
    fn scenario_prompt_status_finish_undo() {
        let mut fx = fixture();
        fx.project.add_prompt("Initial submission").expect("prompt");
        let event = fx
            .project
            .add_status(StatusUpdate::new("Build", "compiling"))
            .expect("status");
        assert_eq!(event.index, 0);

        let commit = fx.project.commit_latest().expect("commit");
        assert_eq!(commit, "commit-1");
        assert_eq!(reload(&fx), fx.project.history());

        let outcome = fx.project.rollback().expect("rollback");
        assert_eq!(outcome.reverted_commit, "commit-1");
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(
            fx.project.history(),
            [HistoryEntry::Prompt("Initial submission".to_string())]
        );
        assert_eq!(reload(&fx), fx.project.history());
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline"]);
    }

    #[test]
    fn commit_is_idempotent() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "done"))
            .expect("status");
        let first = fx.project.commit_latest().expect("commit");
        let second = fx.project.commit_latest().expect("commit again");
        assert_eq!(first, second);
        assert_eq!(fx.vcs.commit_count(), 1);
    }

    #[test]
    fn commit_requires_tail_iteration() {
        let mut fx = fixture();
        assert!(matches!(
            fx.project.commit_latest().unwrap_err(),
            LedgerError::NoOpenIteration
        ));
        fx.project.add_prompt("hello").expect("prompt");
        assert!(matches!(
            fx.project.commit_latest().unwrap_err(),
            LedgerError::NoOpenIteration
        ));
        assert_eq!(fx.vcs.commit_count(), 0);
    }

    #[test]
    fn prompt_is_rejected_while_iteration_open() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "running"))
            .expect("status");
        assert!(matches!(
            fx.project.add_prompt("more").unwrap_err(),
            LedgerError::IterationOpen
        ));
        assert_eq!(reload(&fx).len(), 1);
    }

    #[test]
    fn status_after_commit_opens_new_iteration() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        fx.project.commit_latest().expect("commit");
        let event = fx
            .project
            .add_status(StatusUpdate::new("Build", "b"))
            .expect("status");
        assert_eq!(event.index, 0);
        assert_eq!(fx.project.history().len(), 2);
    }

    #[test]
    fn rollback_without_commit_fails() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        assert!(matches!(
            fx.project.rollback().unwrap_err(),
            LedgerError::NoCommitToRollback
        ));
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline"]);
    }

    #[test]
    fn rollback_drops_trailing_entries_after_commit() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        fx.project.commit_latest().expect("commit");
        fx.project.add_prompt("next").expect("prompt");
        fx.project
            .add_status(StatusUpdate::new("Build", "b"))
            .expect("status");

        let outcome = fx.project.rollback().expect("rollback");
        assert_eq!(outcome.removed.len(), 3);
        assert!(fx.project.history().is_empty());
    }

    #[test]
    fn rollback_refuses_when_working_copy_moved() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        fx.project.commit_latest().expect("commit");
        fx.vcs.push_foreign_checkpoint("stranger");

        let err = fx.project.rollback().unwrap_err();
        assert!(matches!(err, LedgerError::VersionControl { .. }));
        assert_eq!(fx.project.history().len(), 1);
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline", "commit-1", "stranger"]);
    }

    #[test]
    fn failed_write_keeps_memory_at_last_durable_state() {
        let mut fx = fixture();
        fx.project.add_prompt("first").expect("prompt");
        let before = fx.project.history().to_vec();
        break_ledger(&fx.project);

        let err = fx.project.add_prompt("second").unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
        assert_eq!(fx.project.history(), before);

        let err = fx
            .project
            .add_status(StatusUpdate::new("Build", "x"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
        assert_eq!(fx.project.history(), before);
    }

    #[test]
    fn failed_write_after_commit_undoes_checkpoint() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        break_ledger(&fx.project);

        let err = fx.project.commit_latest().unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
        assert!(fx.project.history()[0]
            .as_iteration()
            .is_some_and(Iteration::is_open));
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline"]);
        assert!(fx.vcs.calls().contains(&"reset_to baseline Soft".to_string()));
    }

    #[test]
    fn failed_write_after_rollback_restores_checkpoint() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        fx.project.commit_latest().expect("commit");
        break_ledger(&fx.project);

        let err = fx.project.rollback().unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
        assert_eq!(fx.project.history().len(), 1);
        assert_eq!(fx.vcs.checkpoints(), vec!["baseline", "commit-1"]);
        assert!(fx.vcs.calls().contains(&"reset_to commit-1 Hard".to_string()));
    }

    #[test]
    fn vcs_failure_leaves_history_untouched() {
        let mut fx = fixture();
        fx.project
            .add_status(StatusUpdate::new("Build", "a"))
            .expect("status");
        fx.vcs.fail_next("commit");

        let err = fx.project.commit_latest().unwrap_err();
        assert!(matches!(err, LedgerError::VersionControl { .. }));
        assert!(fx.project.history()[0]
            .as_iteration()
            .is_some_and(Iteration::is_open));
        assert_eq!(reload(&fx), fx.project.history());
    }

    #[test]
    fn load_restores_exact_history() {
        let mut fx = fixture();
        fx.project.add_prompt("Initial submission").expect("prompt");
        fx.project
            .add_status(StatusUpdate::new("Build", "a").with_preview("p.png"))
            .expect("status");
        fx.project.commit_latest().expect("commit");

        let reloaded = Project::load(
            "proj-1",
            fx.project.paths().clone(),
            fx.project.code_dir(),
            fx.vcs.clone(),
        )
        .expect("load");
        assert_eq!(reloaded.history(), fx.project.history());
    }
}
