//! Git-backed checkpoints for a project's code directory.
//!
//! [`VersionControl`] is the seam the ledger depends on; [`GitVersionControl`]
//! implements it with a small, explicit wrapper around `git` subprocess calls.
//! Every failure is surfaced: a missing `git` binary or a broken working copy
//! must never look like a successful commit or rollback.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

const COMMIT_IDENTITY: [&str; 6] = [
    "-c",
    "user.name=workcell",
    "-c",
    "user.email=workcell@localhost",
    "-c",
    "commit.gpgsign=false",
];

/// How far `reset_to` rewinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move the checkpoint pointer only; files are left as they are.
    Soft,
    /// Restore files to the checkpoint and delete untracked files.
    Hard,
}

/// Snapshot mechanism behind commit and rollback.
pub trait VersionControl: Send + Sync {
    /// Create a working copy with a baseline checkpoint if none exists.
    fn ensure_initialized(&self, code_dir: &Path) -> Result<()>;

    /// Stage everything and record a new checkpoint, even if nothing changed.
    fn commit(&self, code_dir: &Path, message: &str) -> Result<String>;

    /// Current checkpoint id.
    fn head(&self, code_dir: &Path) -> Result<String>;

    /// Restore the checkpoint preceding the current one, or the empty
    /// pre-history state when the current checkpoint has no parent.
    fn rollback_to_previous(&self, code_dir: &Path) -> Result<()>;

    /// Move back to a known checkpoint (used to undo a half-finished operation).
    fn reset_to(&self, code_dir: &Path, commit_id: &str, mode: ResetMode) -> Result<()>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if `workdir` itself holds a `.git` directory (not a parent repo).
    pub fn has_own_repo(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    pub fn init(&self) -> Result<()> {
        self.run_checked(&["init", "-q"])?;
        Ok(())
    }

    /// Fail if the repository metadata is unreadable, or if git only finds a
    /// repository in some parent directory.
    pub fn verify_repo(&self) -> Result<()> {
        let out = self
            .run_checked(&["rev-parse", "--git-dir"])
            .context("working copy is not a readable git repository")?;
        let git_dir = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if git_dir != ".git" {
            return Err(anyhow!(
                "{} is not the root of its own repository (git dir: {git_dir})",
                self.workdir.display()
            ));
        }
        Ok(())
    }

    /// Full SHA of `rev`, or `None` if it does not resolve (e.g. unborn HEAD).
    pub fn resolve(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit the index (allowing empty commits) and return the new HEAD SHA.
    #[instrument(skip_all)]
    pub fn commit_index(&self, message: &str) -> Result<String> {
        let mut args: Vec<&str> = COMMIT_IDENTITY.to_vec();
        args.extend(["commit", "-q", "--allow-empty", "--no-verify", "-m", message]);
        self.run_checked(&args)?;
        self.resolve("HEAD")?
            .ok_or_else(|| anyhow!("HEAD missing right after commit"))
    }

    #[instrument(skip_all, fields(rev))]
    pub fn reset(&self, rev: &str, mode: ResetMode) -> Result<()> {
        let flag = match mode {
            ResetMode::Soft => "--soft",
            ResetMode::Hard => "--hard",
        };
        debug!(flag, "resetting");
        self.run_checked(&["reset", "-q", flag, rev])?;
        if mode == ResetMode::Hard {
            self.clean_untracked()?;
        }
        Ok(())
    }

    /// Return to an unborn branch with an empty worktree.
    pub fn reset_to_empty(&self) -> Result<()> {
        self.run_checked(&["update-ref", "-d", "HEAD"])?;
        self.run_checked(&["rm", "-r", "-q", "--cached", "--ignore-unmatch", "."])?;
        self.clean_untracked()
    }

    fn clean_untracked(&self) -> Result<()> {
        self.run_checked(&["clean", "-f", "-d", "-q"])?;
        Ok(())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// [`VersionControl`] over a plain git repository in the code directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitVersionControl;

impl VersionControl for GitVersionControl {
    #[instrument(skip_all, fields(code_dir = %code_dir.display()))]
    fn ensure_initialized(&self, code_dir: &Path) -> Result<()> {
        fs::create_dir_all(code_dir)
            .with_context(|| format!("create code dir {}", code_dir.display()))?;
        let git = Git::new(code_dir);
        if git.has_own_repo() {
            git.verify_repo()?;
        } else {
            info!("initializing working copy");
            git.init()?;
        }
        if git.resolve("HEAD")?.is_none() {
            git.add_all()?;
            let baseline = git.commit_index("workcell: baseline")?;
            info!(commit = %baseline, "baseline checkpoint created");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(code_dir = %code_dir.display()))]
    fn commit(&self, code_dir: &Path, message: &str) -> Result<String> {
        let git = Git::new(code_dir);
        git.verify_repo()?;
        git.add_all()?;
        let id = git.commit_index(message)?;
        info!(commit = %id, "checkpoint created");
        Ok(id)
    }

    fn head(&self, code_dir: &Path) -> Result<String> {
        let git = Git::new(code_dir);
        git.verify_repo()?;
        git.resolve("HEAD")?
            .ok_or_else(|| anyhow!("working copy has no checkpoint yet"))
    }

    #[instrument(skip_all, fields(code_dir = %code_dir.display()))]
    fn rollback_to_previous(&self, code_dir: &Path) -> Result<()> {
        let git = Git::new(code_dir);
        git.verify_repo()?;
        if git.resolve("HEAD")?.is_none() {
            return Err(anyhow!("no checkpoint to roll back"));
        }
        match git.resolve("HEAD~1")? {
            Some(previous) => {
                info!(commit = %previous, "rolling back to previous checkpoint");
                git.reset(&previous, ResetMode::Hard)
            }
            None => {
                warn!("rolling back the first checkpoint; emptying working copy");
                git.reset_to_empty()
            }
        }
    }

    fn reset_to(&self, code_dir: &Path, commit_id: &str, mode: ResetMode) -> Result<()> {
        let git = Git::new(code_dir);
        git.verify_repo()?;
        git.reset(commit_id, mode)
    }
}
