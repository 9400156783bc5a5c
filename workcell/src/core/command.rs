//! Leading-executable extraction and allow-list matching for shell commands.
//!
//! Only the first token is inspected. Shell metacharacters in the arguments
//! of an allowed command (`ls; rm -rf x`, `cat a | sh`, `$(...)`) are passed
//! through to the shell unfiltered. This is a known weakness of the executor
//! and changing it needs a product decision, not a silent fix here.

use std::collections::BTreeSet;

use crate::error::ToolError;

/// Return the first word of `command` as the shell would split it.
///
/// Unbalanced quoting and blank commands are parse failures.
pub fn leading_executable(command: &str) -> Result<String, ToolError> {
    let words = shell_words::split(command).map_err(|err| ToolError::ParseFailure {
        reason: err.to_string(),
    })?;
    words
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::ParseFailure {
            reason: "empty command".to_string(),
        })
}

/// Fixed set of executable names permitted as the leading token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Sorted, comma-separated names for error messages and tool descriptions.
    pub fn describe(&self) -> String {
        self.names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse `command` and check its executable. Returns the executable name.
    ///
    /// Matching is literal: `/bin/ls` does not match an allowed `ls`.
    pub fn check(&self, command: &str) -> Result<String, ToolError> {
        let executable = leading_executable(command)?;
        if !self.contains(&executable) {
            return Err(ToolError::CommandNotAllowed {
                command: executable,
                allowed: self.describe(),
            });
        }
        Ok(executable)
    }
}
