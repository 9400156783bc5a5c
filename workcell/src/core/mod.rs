//! Deterministic, pure logic shared by the workcell.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod command;
pub mod history;
pub mod invariants;
pub mod output;
pub mod types;
