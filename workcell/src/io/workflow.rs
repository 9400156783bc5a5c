//! Handoff to the external workflow engine.
//!
//! The ledger does not depend on the outcome: callers log a failed trigger
//! and carry on. The context text is rendered from an embedded template so
//! the engine sees the same shape for every project.

use std::path::PathBuf;

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::info;

use crate::core::types::{HistoryEntry, StatusEvent};

const HANDOFF_TEMPLATE: &str = include_str!("prompts/handoff.md");

/// What the workflow engine receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub project_id: String,
    /// Submission file for a new project, code directory for a follow-up.
    pub input_path: PathBuf,
    pub context: String,
}

/// Starts work in the external engine. The return value is only logged.
pub trait WorkflowTrigger: Send + Sync {
    fn trigger(&self, request: &HandoffRequest) -> Result<()>;
}

/// Trigger that records the handoff in the trace and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTrigger;

impl WorkflowTrigger for LoggingTrigger {
    fn trigger(&self, request: &HandoffRequest) -> Result<()> {
        info!(
            project_id = %request.project_id,
            input = %request.input_path.display(),
            context_chars = request.context.chars().count(),
            "workflow handoff"
        );
        Ok(())
    }
}

/// Render the context text for `project_id` from its history.
pub fn render_handoff_context(project_id: &str, entries: &[HistoryEntry]) -> Result<String> {
    let prompts: Vec<&str> = entries.iter().filter_map(HistoryEntry::as_prompt).collect();
    let latest: Option<&StatusEvent> = entries
        .iter()
        .rev()
        .filter_map(HistoryEntry::as_iteration)
        .find_map(|iteration| iteration.events.last());

    let mut env = Environment::new();
    env.add_template("handoff", HANDOFF_TEMPLATE)?;
    let rendered = env.get_template("handoff")?.render(context! {
        project_id => project_id,
        prompts => prompts,
        latest => latest,
    })?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Iteration;

    #[test]
    fn context_lists_prompts_in_order() {
        let entries = vec![
            HistoryEntry::Prompt("Initial submission".to_string()),
            HistoryEntry::Prompt("add a dark mode".to_string()),
        ];
        let text = render_handoff_context("proj-7", &entries).expect("render");
        assert!(text.contains("# Project proj-7"));
        let first = text.find("- Initial submission").expect("first prompt");
        let second = text.find("- add a dark mode").expect("second prompt");
        assert!(first < second);
        assert!(!text.contains("Latest status"));
    }

    #[test]
    fn context_includes_most_recent_status_event() {
        let entries = vec![
            HistoryEntry::Prompt("Initial submission".to_string()),
            HistoryEntry::Iteration(Iteration {
                events: vec![
                    StatusEvent {
                        stage: "Build".to_string(),
                        message: "compiling".to_string(),
                        zip_result: None,
                        preview: None,
                        index: 0,
                    },
                    StatusEvent {
                        stage: "Deploy".to_string(),
                        message: "uploaded".to_string(),
                        zip_result: Some("site.zip".to_string()),
                        preview: None,
                        index: 1,
                    },
                ],
                commit_id: Some("abc".to_string()),
            }),
            HistoryEntry::Iteration(Iteration::default()),
        ];
        let text = render_handoff_context("proj-7", &entries).expect("render");
        assert!(text.contains("- Stage: Deploy"));
        assert!(text.contains("- Result: site.zip"));
        assert!(!text.contains("compiling"));
        assert!(!text.contains("Preview:"));
    }
}
