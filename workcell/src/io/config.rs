//! Workcell configuration (TOML file plus `WORKCELL_*` environment overrides).
//!
//! Loaded once at startup and threaded into component constructors; nothing
//! reads the process environment after that.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::command::AllowList;

pub const ENV_WORKSPACE_ROOT: &str = "WORKCELL_WORKSPACE_ROOT";
pub const ENV_DATA_DIR: &str = "WORKCELL_DATA_DIR";
pub const ENV_CODE_DIR: &str = "WORKCELL_CODE_DIR";
pub const ENV_ALLOWED_COMMANDS: &str = "WORKCELL_ALLOWED_COMMANDS";
pub const ENV_SHELL_TIMEOUT_SECS: &str = "WORKCELL_SHELL_TIMEOUT_SECS";
pub const ENV_OUTPUT_LIMIT_CHARS: &str = "WORKCELL_OUTPUT_LIMIT_CHARS";

/// Workcell configuration (TOML).
///
/// Missing fields default to the values the tool surface was designed around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkcellConfig {
    /// Directory every file and shell operation is confined to.
    pub workspace_root: PathBuf,

    /// Parent of the per-project directories (ledger + submission).
    pub data_dir: PathBuf,

    /// Versioned code directory, relative to `workspace_root`.
    pub code_dir: PathBuf,

    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Executable names allowed as the first word of a command.
    pub allowed_commands: Vec<String>,

    /// Wall-clock budget per command.
    pub timeout_secs: u64,

    /// Combined stdout+stderr beyond this many characters is truncated.
    pub output_limit_chars: usize,

    /// `PATH` handed to subprocesses; the host environment is not inherited.
    pub path: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            allowed_commands: [
                "ls", "cat", "git", "python", "pytest", "ruff", "node", "npm", "rg", "pip",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timeout_secs: 25,
            output_limit_chars: 8000,
            path: "/usr/local/bin:/usr/bin:/bin".to_string(),
        }
    }
}

impl ShellConfig {
    pub fn allow_list(&self) -> AllowList {
        AllowList::new(self.allowed_commands.iter().cloned())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WorkcellConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("workspace"),
            data_dir: PathBuf::from("data/projects"),
            code_dir: PathBuf::from("."),
            shell: ShellConfig::default(),
        }
    }
}

impl WorkcellConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(anyhow!("workspace_root must not be empty"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("data_dir must not be empty"));
        }
        if self.code_dir.is_absolute() {
            return Err(anyhow!("code_dir must be relative to workspace_root"));
        }
        if self.shell.timeout_secs == 0 {
            return Err(anyhow!("shell.timeout_secs must be > 0"));
        }
        if self.shell.output_limit_chars == 0 {
            return Err(anyhow!("shell.output_limit_chars must be > 0"));
        }
        if self.shell.allowed_commands.is_empty() {
            return Err(anyhow!("shell.allowed_commands must not be empty"));
        }
        for name in &self.shell.allowed_commands {
            if name.trim().is_empty() {
                return Err(anyhow!("shell.allowed_commands contains a blank entry"));
            }
            if name.contains('/') || name.chars().any(char::is_whitespace) {
                return Err(anyhow!(
                    "shell.allowed_commands entries must be bare executable names (got '{name}')"
                ));
            }
        }
        Ok(())
    }

    /// Absolute versioned code directory.
    pub fn code_dir_path(&self) -> PathBuf {
        self.workspace_root.join(&self.code_dir)
    }

    /// Apply `WORKCELL_*` overrides using `lookup` as the environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_WORKSPACE_ROOT) {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_CODE_DIR) {
            self.code_dir = PathBuf::from(dir);
        }
        if let Some(list) = lookup(ENV_ALLOWED_COMMANDS) {
            self.shell.allowed_commands = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = lookup(ENV_SHELL_TIMEOUT_SECS) {
            self.shell.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("parse {ENV_SHELL_TIMEOUT_SECS}={secs}"))?;
        }
        if let Some(limit) = lookup(ENV_OUTPUT_LIMIT_CHARS) {
            self.shell.output_limit_chars = limit
                .trim()
                .parse()
                .with_context(|| format!("parse {ENV_OUTPUT_LIMIT_CHARS}={limit}"))?;
        }
        Ok(())
    }

    /// Warn about layouts that weaken the sandbox without being invalid.
    fn warn_on_risky_layout(&self) {
        if self.data_dir.starts_with(&self.workspace_root) {
            warn!(
                data_dir = %self.data_dir.display(),
                workspace_root = %self.workspace_root.display(),
                "data_dir is inside the workspace; agent tools can edit ledgers"
            );
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WorkcellConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkcellConfig> {
    if !path.exists() {
        let cfg = WorkcellConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkcellConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Startup entry point: file, then process environment, then validation.
pub fn load_startup_config(path: &Path) -> Result<WorkcellConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    cfg.warn_on_risky_layout();
    debug!(
        workspace_root = %cfg.workspace_root.display(),
        data_dir = %cfg.data_dir.display(),
        allowed = %cfg.shell.allow_list().describe(),
        "config loaded"
    );
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, WorkcellConfig::default());
        assert_eq!(cfg.shell.timeout_secs, 25);
        assert_eq!(cfg.shell.output_limit_chars, 8000);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workcell.toml");
        fs::write(
            &path,
            "workspace_root = \"/srv/ws\"\n\n[shell]\nallowed_commands = [\"ls\", \"cat\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.workspace_root, PathBuf::from("/srv/ws"));
        assert_eq!(cfg.shell.allowed_commands, vec!["ls", "cat"]);
        assert_eq!(cfg.shell.timeout_secs, 25);
        assert_eq!(cfg.data_dir, PathBuf::from("data/projects"));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_WORKSPACE_ROOT, "/tmp/ws"),
            (ENV_ALLOWED_COMMANDS, "ls, git ,,cat"),
            (ENV_SHELL_TIMEOUT_SECS, "5"),
            (ENV_OUTPUT_LIMIT_CHARS, "100"),
        ]);
        let mut cfg = WorkcellConfig::default();
        cfg.apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(cfg.workspace_root, PathBuf::from("/tmp/ws"));
        assert_eq!(cfg.shell.allowed_commands, vec!["ls", "git", "cat"]);
        assert_eq!(cfg.shell.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.shell.output_limit_chars, 100);
        cfg.validate().expect("valid");
    }

    #[test]
    fn env_override_with_bad_number_fails() {
        let mut cfg = WorkcellConfig::default();
        let err = cfg
            .apply_env(|key| (key == ENV_SHELL_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_SHELL_TIMEOUT_SECS));
    }

    #[test]
    fn validate_rejects_paths_in_allow_list() {
        let mut cfg = WorkcellConfig::default();
        cfg.shell.allowed_commands = vec!["/bin/sh".to_string()];
        assert!(cfg.validate().is_err());

        cfg.shell.allowed_commands = vec!["ls".to_string()];
        cfg.shell.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
