//! Side-effecting adapters: filesystem, subprocesses, git, ledger files.

pub mod config;
pub mod git;
pub mod ledger_store;
pub mod path_guard;
pub mod process;
pub mod shell;
pub mod workflow;
pub mod workspace;
