//! Agent-facing tool surface.
//!
//! Four tools, each with a name, a description and a JSON Schema for its
//! arguments. Every call returns a single string; failures are reported as
//! `Error: <description>` in the same channel, which is the contract the
//! orchestrator consumes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::error::ToolError;
use crate::io::config::WorkcellConfig;
use crate::io::path_guard::PathGuard;
use crate::io::shell::{ExecutionResult, ShellExecutor};
use crate::io::workspace::{DirEntry, EntryKind, WorkspaceFiles};

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const SHELL_COMMAND: &str = "shell_command";

/// Full definition of a tool including its parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default = "current_dir")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
}

fn current_dir() -> String {
    ".".to_string()
}

struct RegisteredTool {
    definition: ToolDefinition,
    validator: Validator,
}

/// The four workspace tools, bound to one workspace root.
pub struct ToolRegistry {
    files: WorkspaceFiles,
    shell: ShellExecutor,
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new(files: WorkspaceFiles, shell: ShellExecutor) -> Result<Self> {
        let tools = definitions_for(&shell)
            .into_iter()
            .map(|definition| {
                let validator = validator_for(&definition.parameters)
                    .map_err(|err| anyhow!("invalid schema for {}: {}", definition.name, err))?;
                Ok(RegisteredTool {
                    definition,
                    validator,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            files,
            shell,
            tools,
        })
    }

    /// Build the registry for `config.workspace_root`, creating it if needed.
    pub fn from_config(config: &WorkcellConfig) -> Result<Self> {
        let root = &config.workspace_root;
        fs::create_dir_all(root)
            .with_context(|| format!("create workspace root {}", root.display()))?;
        let guard = PathGuard::new(root)
            .with_context(|| format!("open workspace root {}", root.display()))?;
        let shell = ShellExecutor::new(guard.root(), &config.shell);
        Self::new(WorkspaceFiles::new(guard), shell)
    }

    pub fn workspace_root(&self) -> &Path {
        self.files.root()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Validate `args` against the tool's schema and run it.
    #[instrument(skip_all, fields(tool = name))]
    pub fn call(&self, name: &str, args: &Value) -> String {
        match self.dispatch(name, args) {
            Ok(text) => text,
            Err(err) => {
                warn!(err = %err, "tool call rejected");
                error_text(&err)
            }
        }
    }

    pub fn read_file(&self, path: &str) -> String {
        render(self.files.read_file(path))
    }

    pub fn write_file(&self, path: &str, content: &str) -> String {
        render(
            self.files
                .write_file(path, content)
                .map(|bytes| format!("Success: wrote {bytes} bytes to {path}")),
        )
    }

    pub fn list_directory(&self, path: &str) -> String {
        render(self.files.list_directory(path).map(|entries| format_listing(&entries)))
    }

    pub fn shell_command(&self, command: &str) -> String {
        render(self.shell.run(command).map(|result| format_execution(&result)))
    }

    fn dispatch(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;
        if !tool.validator.is_valid(args) {
            let messages = tool
                .validator
                .iter_errors(args)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            return Err(invalid(name, messages.join("; ")));
        }
        debug!("arguments valid");

        let text = match name {
            READ_FILE => {
                let args: PathArgs = parse_args(name, args)?;
                self.read_file(&args.path)
            }
            WRITE_FILE => {
                let args: WriteArgs = parse_args(name, args)?;
                self.write_file(&args.path, &args.content)
            }
            LIST_DIRECTORY => {
                let args: ListArgs = parse_args(name, args)?;
                self.list_directory(&args.path)
            }
            SHELL_COMMAND => {
                let args: ShellArgs = parse_args(name, args)?;
                self.shell_command(&args.command)
            }
            other => {
                return Err(ToolError::UnknownTool {
                    name: other.to_string(),
                });
            }
        };
        Ok(text)
    }
}

fn definitions_for(shell: &ShellExecutor) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            READ_FILE,
            "Read a UTF-8 text file from the workspace.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to file relative to workspace"}
                },
                "required": ["path"],
                "additionalProperties": false
            }),
        ),
        ToolDefinition::new(
            WRITE_FILE,
            "Write UTF-8 text to a file in the workspace (creates directories).",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to file relative to workspace"},
                    "content": {"type": "string", "description": "Content to write to the file"}
                },
                "required": ["path", "content"],
                "additionalProperties": false
            }),
        ),
        ToolDefinition::new(
            LIST_DIRECTORY,
            "List files and directories in the workspace.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "default": ".",
                        "description": "Directory path relative to workspace"
                    }
                },
                "additionalProperties": false
            }),
        ),
        ToolDefinition::new(
            SHELL_COMMAND,
            format!(
                "Run a shell command in the workspace. Only the first word is checked. Allowed: {}",
                shell.allow_list().describe()
            ),
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Shell command line"}
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        ),
    ]
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|err| invalid(tool, err.to_string()))
}

fn invalid(tool: &str, reason: String) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    }
}

fn render(result: Result<String, ToolError>) -> String {
    result.unwrap_or_else(|err| error_text(&err))
}

fn error_text(err: &ToolError) -> String {
    format!("Error: {err}")
}

fn format_listing(entries: &[DirEntry]) -> String {
    if entries.is_empty() {
        return "(empty directory)".to_string();
    }
    entries
        .iter()
        .map(|entry| match (entry.kind, entry.size_bytes) {
            (EntryKind::File, Some(size)) => format!("FILE\t{} ({size} bytes)", entry.name),
            (EntryKind::File, None) => format!("FILE\t{}", entry.name),
            (EntryKind::Dir, _) => format!("DIR\t{}", entry.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_execution(result: &ExecutionResult) -> String {
    let body = if result.output.trim().is_empty() {
        "(no output)"
    } else {
        result.output.as_str()
    };
    match result.exit_code {
        Some(code) => format!("{body}\n[exit code: {code}]"),
        None => format!("{body}\n[exit code: signal]"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::io::config::ShellConfig;

    fn registry(allowed: &[&str]) -> (tempfile::TempDir, ToolRegistry) {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = WorkcellConfig {
            workspace_root: temp.path().join("ws"),
            shell: ShellConfig {
                allowed_commands: allowed.iter().map(|s| s.to_string()).collect(),
                ..ShellConfig::default()
            },
            ..WorkcellConfig::default()
        };
        let registry = ToolRegistry::from_config(&config).expect("registry");
        (temp, registry)
    }

    #[test]
    fn exposes_exactly_four_tools_with_allow_list_in_shell_description() {
        let (_temp, registry) = registry(&["ls", "cat", "git"]);
        let defs = registry.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, [READ_FILE, WRITE_FILE, LIST_DIRECTORY, SHELL_COMMAND]);
        assert!(defs[3].description.ends_with("Allowed: cat, git, ls"));
    }

    #[test]
    fn write_then_read_through_call() {
        let (_temp, registry) = registry(&["ls"]);
        let out = registry.call(WRITE_FILE, &json!({"path": "src/app.py", "content": "print(1)\n"}));
        assert_eq!(out, "Success: wrote 9 bytes to src/app.py");
        let out = registry.call(READ_FILE, &json!({"path": "src/app.py"}));
        assert_eq!(out, "print(1)\n");
    }

    #[test]
    fn list_formats_rows_and_defaults_path() {
        let (_temp, registry) = registry(&["ls"]);
        assert_eq!(registry.call(LIST_DIRECTORY, &json!({})), "(empty directory)");

        registry.write_file("a.txt", "abc");
        registry.write_file("lib/b.txt", "");
        assert_eq!(
            registry.call(LIST_DIRECTORY, &json!({"path": "."})),
            "FILE\ta.txt (3 bytes)\nDIR\tlib"
        );
    }

    #[test]
    fn shell_output_carries_exit_code_line() {
        let (_temp, registry) = registry(&["ls", "true"]);
        registry.write_file("x.txt", "");
        assert_eq!(registry.shell_command("ls"), "x.txt\n\n[exit code: 0]");
        assert_eq!(registry.shell_command("true"), "(no output)\n[exit code: 0]");
    }

    #[test]
    fn failures_are_error_strings() {
        let (_temp, registry) = registry(&["ls", "cat", "git"]);
        let out = registry.call(SHELL_COMMAND, &json!({"command": "rm -rf /"}));
        assert_eq!(out, "Error: 'rm' not allowed. Allowed: cat, git, ls");

        let out = registry.call(READ_FILE, &json!({"path": "../secret"}));
        assert!(out.starts_with("Error: path outside workspace"), "{out}");

        let out = registry.call(READ_FILE, &json!({"path": 7}));
        assert!(out.starts_with("Error: invalid arguments for read_file"), "{out}");

        let out = registry.call(READ_FILE, &json!({"path": "a", "mode": "rb"}));
        assert!(out.starts_with("Error: invalid arguments"), "{out}");

        let out = registry.call("delete_file", &json!({"path": "a"}));
        assert_eq!(out, "Error: unknown tool: delete_file");
    }
}
