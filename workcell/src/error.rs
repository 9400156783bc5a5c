//! Typed errors returned at component boundaries.
//!
//! Internals use `anyhow` with context; these enums are what callers of the
//! tool surface and the ledger match on. Only the tool registry turns them
//! into `"Error: ..."` text.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a workspace tool (path guard, file tools, shell executor, registry).
#[derive(Debug, Error)]
pub enum ToolError {
    /// The resolved path is not the workspace root or a descendant of it.
    #[error("path outside workspace: {path}")]
    OutsideRoot { path: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Leading executable is not in the allow-list. Nothing was executed.
    #[error("'{command}' not allowed. Allowed: {allowed}")]
    CommandNotAllowed { command: String, allowed: String },

    #[error("could not parse command: {reason}")]
    ParseFailure { reason: String },

    /// The subprocess group was killed; no partial output is returned.
    #[error("command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("failed to execute {command}: {reason}")]
    ExecFailed { command: String, reason: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
}

impl ToolError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a ledger operation on a project.
///
/// Every variant leaves the in-memory history equal to the last persisted one.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `commit_latest` needs the tail entry to be an iteration.
    #[error("no iteration at the tail of history")]
    NoOpenIteration,

    /// A prompt cannot be appended while the tail iteration is still open.
    #[error("iteration still open; finish it before adding a prompt")]
    IterationOpen,

    #[error("no committed iteration to roll back")]
    NoCommitToRollback,

    #[error("persist ledger {path}: {reason:#}")]
    Persistence { path: PathBuf, reason: anyhow::Error },

    #[error("version control: {reason:#}")]
    VersionControl { reason: anyhow::Error },

    #[error("project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("project already exists: {id}")]
    ProjectExists { id: String },

    #[error("invalid project id '{id}': {reason}")]
    InvalidProjectId { id: String, reason: String },

    #[error("store submission: {reason:#}")]
    Upload { reason: anyhow::Error },
}

impl LedgerError {
    pub(crate) fn vcs(reason: anyhow::Error) -> Self {
        LedgerError::VersionControl { reason }
    }
}
