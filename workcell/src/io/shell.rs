//! Allow-listed shell execution inside the workspace.
//!
//! A command is accepted only if its first word is in the allow-list; the
//! full line then runs under `/bin/sh -c` with the workspace root as working
//! directory, an explicit two-variable environment, and a wall-clock timeout.
//! See [`crate::core::command`] for what the allow-list does not cover.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::command::AllowList;
use crate::core::output::{cap_output, capture_budget_bytes};
use crate::error::ToolError;
use crate::io::config::ShellConfig;
use crate::io::process::run_command_with_timeout;

const SHELL: &str = "/bin/sh";

/// Result of a command that ran to completion (any exit code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// stdout followed by stderr, capped to the configured character limit.
    pub output: String,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ShellExecutor {
    workdir: PathBuf,
    allow_list: AllowList,
    timeout: Duration,
    output_limit_chars: usize,
    path_env: String,
}

impl ShellExecutor {
    pub fn new(workdir: impl Into<PathBuf>, config: &ShellConfig) -> Self {
        Self {
            workdir: workdir.into(),
            allow_list: config.allow_list(),
            timeout: config.timeout(),
            output_limit_chars: config.output_limit_chars,
            path_env: config.path.clone(),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Check, run and capture `command`.
    ///
    /// Rejected commands never spawn a process. A timeout kills the process
    /// group and reports [`ToolError::Timeout`] without partial output.
    #[instrument(skip_all, fields(command))]
    pub fn run(&self, command: &str) -> Result<ExecutionResult, ToolError> {
        if let Err(err) = self.allow_list.check(command) {
            warn!(err = %err, "shell command rejected");
            return Err(err);
        }

        let mut cmd = Command::new(SHELL);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .env_clear()
            .env("PATH", &self.path_env)
            .env("HOME", &self.workdir);

        let captured = run_command_with_timeout(
            cmd,
            self.timeout,
            capture_budget_bytes(self.output_limit_chars),
        )
        .map_err(|err| ToolError::ExecFailed {
            command: command.to_string(),
            reason: format!("{err:#}"),
        })?;

        if captured.timed_out {
            return Err(ToolError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            });
        }

        let mut combined = String::from_utf8_lossy(&captured.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&captured.stderr));
        let capped = cap_output(combined, self.output_limit_chars);

        info!(
            exit_code = ?captured.status.code(),
            truncated = capped.truncated,
            "shell command finished"
        );
        Ok(ExecutionResult {
            output: capped.text,
            exit_code: captured.status.code(),
            truncated: capped.truncated,
        })
    }
}
