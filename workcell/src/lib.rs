//! Sandboxed workspace tools with a replayable, checkpointed work history.
//!
//! An agent reads, writes and lists files and runs allow-listed shell
//! commands, all confined to one workspace root. Each unit of its work is
//! recorded in a per-project ledger of prompts and iterations, and finished
//! iterations are pinned to version-control checkpoints that can be undone.
//!
//! - **[`core`]**: Pure, deterministic logic (history state machine, command
//!   allow-listing, output capping). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, path containment, files,
//!   processes, git, ledger files, workflow handoff).
//!
//! [`tools`], [`project`], [`store`] and [`service`] compose the two into the
//! agent-facing tool surface and the ledger operations a request layer calls.

pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod project;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
