//! Test-only fixtures: scratch workspaces and a scripted version control.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::io::config::{ShellConfig, WorkcellConfig};
use crate::io::git::{ResetMode, VersionControl};
use crate::store::lock;

/// Temp directory holding a workspace root and a data dir outside it.
pub struct TestWorkspace {
    temp: tempfile::TempDir,
    config: WorkcellConfig,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Self::with_allowed(&["ls", "cat", "git"])
    }

    pub fn with_allowed(allowed: &[&str]) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let workspace = temp.path().join("workspace");
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("create {}", workspace.display()))?;
        let config = WorkcellConfig {
            workspace_root: workspace,
            data_dir: temp.path().join("data"),
            code_dir: PathBuf::from("."),
            shell: ShellConfig {
                allowed_commands: allowed.iter().map(|s| s.to_string()).collect(),
                ..ShellConfig::default()
            },
        };
        Ok(Self { temp, config })
    }

    pub fn config(&self) -> &WorkcellConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorkcellConfig {
        &mut self.config
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn workspace(&self) -> &Path {
        &self.config.workspace_root
    }
}

/// In-memory [`VersionControl`] with a linear list of checkpoint ids.
///
/// Commits are named `commit-1`, `commit-2`, ...; initialization adds
/// `baseline`. `fail_next` makes the next call of one operation fail.
#[derive(Debug, Default)]
pub struct ScriptedVcs {
    state: Mutex<ScriptedState>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    checkpoints: Vec<String>,
    calls: Vec<String>,
    commits: u32,
    fail_next: Option<String>,
}

impl ScriptedState {
    fn enter(&mut self, call: String, op: &str) -> Result<()> {
        self.calls.push(call);
        if self.fail_next.as_deref() == Some(op) {
            self.fail_next = None;
            return Err(anyhow!("scripted {op} failure"));
        }
        Ok(())
    }
}

impl ScriptedVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, op: &str) {
        lock(&self.state).fail_next = Some(op.to_string());
    }

    /// Simulate an out-of-band checkpoint (someone committed behind our back).
    pub fn push_foreign_checkpoint(&self, id: &str) {
        lock(&self.state).checkpoints.push(id.to_string());
    }

    pub fn checkpoints(&self) -> Vec<String> {
        lock(&self.state).checkpoints.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn commit_count(&self) -> u32 {
        lock(&self.state).commits
    }
}

impl VersionControl for ScriptedVcs {
    fn ensure_initialized(&self, _code_dir: &Path) -> Result<()> {
        let mut state = lock(&self.state);
        state.enter("ensure_initialized".to_string(), "ensure_initialized")?;
        if state.checkpoints.is_empty() {
            state.checkpoints.push("baseline".to_string());
        }
        Ok(())
    }

    fn commit(&self, _code_dir: &Path, message: &str) -> Result<String> {
        let mut state = lock(&self.state);
        state.enter(format!("commit {message}"), "commit")?;
        state.commits += 1;
        let id = format!("commit-{}", state.commits);
        state.checkpoints.push(id.clone());
        Ok(id)
    }

    fn head(&self, _code_dir: &Path) -> Result<String> {
        let mut state = lock(&self.state);
        state.enter("head".to_string(), "head")?;
        state
            .checkpoints
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("no checkpoint"))
    }

    fn rollback_to_previous(&self, _code_dir: &Path) -> Result<()> {
        let mut state = lock(&self.state);
        state.enter("rollback_to_previous".to_string(), "rollback_to_previous")?;
        state
            .checkpoints
            .pop()
            .map(|_| ())
            .ok_or_else(|| anyhow!("no checkpoint to roll back"))
    }

    fn reset_to(&self, _code_dir: &Path, commit_id: &str, mode: ResetMode) -> Result<()> {
        let mut state = lock(&self.state);
        state.enter(format!("reset_to {commit_id} {mode:?}"), "reset_to")?;
        match state.checkpoints.iter().position(|id| id == commit_id) {
            Some(position) => state.checkpoints.truncate(position + 1),
            None => state.checkpoints.push(commit_id.to_string()),
        }
        Ok(())
    }
}
