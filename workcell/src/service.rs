//! Operations a thin request layer calls.
//!
//! `Workcell` wires configuration, the project store, the tool registry and
//! the workflow trigger together. It never holds a project lock while the
//! trigger runs, and a failing trigger is logged without touching the ledger.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::{HistoryEntry, StatusEvent, StatusUpdate};
use crate::error::LedgerError;
use crate::io::config::WorkcellConfig;
use crate::io::git::{GitVersionControl, VersionControl};
use crate::io::ledger_store::write_submission;
use crate::io::workflow::{HandoffRequest, LoggingTrigger, WorkflowTrigger, render_handoff_context};
use crate::project::RollbackOutcome;
use crate::store::{ProjectStore, generate_project_id, lock};
use crate::tools::ToolRegistry;

pub const INITIAL_PROMPT: &str = "Initial submission";

pub struct Workcell {
    store: ProjectStore,
    tools: ToolRegistry,
    trigger: Arc<dyn WorkflowTrigger>,
}

impl Workcell {
    pub fn new(
        config: &WorkcellConfig,
        vcs: Arc<dyn VersionControl>,
        trigger: Arc<dyn WorkflowTrigger>,
    ) -> Result<Self> {
        let tools = ToolRegistry::from_config(config)?;
        let store = ProjectStore::from_config(config, vcs);
        Ok(Self {
            store,
            tools,
            trigger,
        })
    }

    /// Git checkpoints and a logging-only workflow trigger.
    pub fn from_config(config: &WorkcellConfig) -> Result<Self> {
        Self::new(config, Arc::new(GitVersionControl), Arc::new(LoggingTrigger))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Create a project for an uploaded file and hand it to the workflow.
    /// Returns the new project id.
    #[instrument(skip_all, fields(bytes = file_bytes.len()))]
    pub fn start_iteration(&self, file_bytes: &[u8]) -> Result<String, LedgerError> {
        let id = generate_project_id();
        let paths = self.store.paths(&id)?;
        write_submission(&paths.submission, file_bytes)
            .map_err(|reason| LedgerError::Upload { reason })?;

        let handle = self.store.create(&id)?;
        let context = {
            let mut project = lock(&handle);
            project.add_prompt(INITIAL_PROMPT)?;
            render_handoff_context(&id, project.history())
        };
        self.hand_off(&id, paths.submission, context);
        info!(project_id = %id, "iteration started");
        Ok(id)
    }

    /// Record a follow-up request and hand the code directory to the workflow.
    #[instrument(skip_all, fields(project_id))]
    pub fn submit_prompt(&self, project_id: &str, text: &str) -> Result<(), LedgerError> {
        let (code_dir, context) = self.store.with_project(project_id, |project| {
            project.add_prompt(text)?;
            Ok((
                project.code_dir().to_path_buf(),
                render_handoff_context(project_id, project.history()),
            ))
        })?;
        self.hand_off(project_id, code_dir, context);
        Ok(())
    }

    pub fn get_history(&self, project_id: &str) -> Result<Vec<HistoryEntry>, LedgerError> {
        self.store
            .with_project(project_id, |project| Ok(project.history().to_vec()))
    }

    pub fn record_status(
        &self,
        project_id: &str,
        update: StatusUpdate,
    ) -> Result<StatusEvent, LedgerError> {
        self.store
            .with_project(project_id, |project| project.add_status(update))
    }

    /// Seal the current iteration; returns its checkpoint id.
    pub fn finish_iteration(&self, project_id: &str) -> Result<String, LedgerError> {
        self.store
            .with_project(project_id, |project| project.commit_latest())
    }

    pub fn undo(&self, project_id: &str) -> Result<RollbackOutcome, LedgerError> {
        self.store
            .with_project(project_id, |project| project.rollback())
    }

    pub fn list_projects(&self) -> Result<Vec<String>, LedgerError> {
        self.store.list()
    }

    fn hand_off(&self, project_id: &str, input_path: PathBuf, context: Result<String>) {
        let context = match context {
            Ok(context) => context,
            Err(err) => {
                warn!(project_id, err = %format!("{err:#}"), "handoff context failed to render");
                return;
            }
        };
        let request = HandoffRequest {
            project_id: project_id.to_string(),
            input_path,
            context,
        };
        if let Err(err) = self.trigger.trigger(&request) {
            warn!(project_id, err = %format!("{err:#}"), "workflow trigger failed");
        }
    }
}
