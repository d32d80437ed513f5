//! Tool implementations
//!
//! Tools are stateless singletons; per-call context arrives via `ToolContext`.

mod add;
mod evaluate;
pub mod expr;
mod plot_graph;
pub mod policy;
mod reverse;
mod run_cmd;
mod search;
mod write_file;

pub use add::AddTool;
pub use evaluate::EvaluateTool;
pub use plot_graph::PlotGraphTool;
pub use policy::{PolicyDecision, RuleAction, RulePolicy, ToolConfirmer, ToolExecutionPolicy};
pub use reverse::ReverseTool;
pub use run_cmd::RunCmdTool;
pub use search::{SearchConfig, SearchTool};
pub use write_file::WriteFileTool;

use crate::db::ResultKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub kind: ResultKind,
    /// Rendered value; JSON results hold the serialized document
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            kind: ResultKind::Text,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: ResultKind::Text,
            output: message.into(),
        }
    }

    pub fn json(value: &Value) -> Self {
        Self {
            success: true,
            kind: ResultKind::Json,
            output: value.to_string(),
        }
    }

    /// Error carried as a JSON document (`{"error": ...}`)
    pub fn json_error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: ResultKind::Json,
            output: serde_json::json!({ "error": message.into() }).to_string(),
        }
    }

    pub fn file_path(path: &std::path::Path) -> Self {
        Self {
            success: true,
            kind: ResultKind::FilePath,
            output: path.display().to_string(),
        }
    }

    pub fn image_path(path: &std::path::Path) -> Self {
        Self {
            success: true,
            kind: ResultKind::ImagePath,
            output: path.display().to_string(),
        }
    }
}

/// All context needed for a tool invocation.
///
/// Created fresh for each tool call. Tools derive all context from this struct.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,

    /// The session this tool is executing within
    pub session_id: String,

    /// Working directory for shell commands
    pub working_dir: PathBuf,

    /// Directory that receives written files and plots
    pub artifact_dir: PathBuf,
}

impl ToolContext {
    pub fn new(
        cancel: CancellationToken,
        session_id: impl Into<String>,
        working_dir: PathBuf,
        artifact_dir: PathBuf,
    ) -> Self {
        Self {
            cancel,
            session_id: session_id.into(),
            working_dir,
            artifact_dir,
        }
    }
}

/// Declared metadata for a tool, as advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    /// Side effects outside the process (filesystem, shell)
    pub destructive: bool,
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Whether the execution policy should guard this tool
    fn destructive(&self) -> bool {
        false
    }

    /// Execute the tool with all context provided via `ToolContext`
    ///
    /// Tools that spawn subprocesses should monitor `ctx.cancel` and
    /// terminate them when cancelled.
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description(),
            parameter_schema: self.input_schema(),
            destructive: self.destructive(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Settings for the built-in tool catalogue
#[derive(Debug, Clone, Default)]
pub struct ToolSettings {
    pub search: SearchConfig,
    /// Overrides the shell command timeout
    pub command_timeout: Option<Duration>,
}

/// Collection of tools available to sessions, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue
    pub fn standard(settings: &ToolSettings) -> Self {
        let run_cmd = match settings.command_timeout {
            Some(timeout) => RunCmdTool::with_timeout(timeout),
            None => RunCmdTool::default(),
        };

        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(AddTool),
            Arc::new(ReverseTool),
            Arc::new(EvaluateTool),
            Arc::new(run_cmd),
            Arc::new(SearchTool::new(settings.search.clone())),
            Arc::new(WriteFileTool),
            Arc::new(PlotGraphTool),
        ];

        Self { tools }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|t| crate::llm::ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Parse tool input, turning serde failures into an error output
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(input).map_err(|e| ToolOutput::error(format!("Invalid input: {e}")))
}

#[cfg(test)]
pub(crate) fn test_context(artifact_dir: &std::path::Path) -> ToolContext {
    ToolContext::new(
        CancellationToken::new(),
        "test-session",
        std::env::temp_dir(),
        artifact_dir.to_path_buf(),
    )
}
