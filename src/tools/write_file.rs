//! Write content to a file in the artifact directory

use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct WriteFileTool;

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    name: String,
    extension: String,
    content: String,
}

/// Reject anything that could escape the artifact directory
fn validate_component(label: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{label} cannot be empty"));
    }
    if value.contains(['/', '\\', '\0']) || value.contains("..") {
        return Err(format!(
            "{label} must not contain path separators or '..': {value}"
        ));
    }
    Ok(())
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> String {
        "Write text content to a new file and return its path. Use this whenever \
         the user asks for code: save it to a file with the right extension."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["name", "extension", "content"],
            "properties": {
                "name": {"type": "string", "description": "File name without extension"},
                "extension": {"type": "string", "description": "File extension, e.g. py or txt"},
                "content": {"type": "string", "description": "Full file content"}
            }
        })
    }

    fn destructive(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: WriteFileInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        let extension = input.extension.trim_start_matches('.');
        if let Err(e) = validate_component("name", &input.name)
            .and_then(|()| validate_component("extension", extension))
        {
            return ToolOutput::error(e);
        }

        if let Err(e) = tokio::fs::create_dir_all(&ctx.artifact_dir).await {
            return ToolOutput::error(format!(
                "Failed to create {}: {e}",
                ctx.artifact_dir.display()
            ));
        }

        let path = ctx
            .artifact_dir
            .join(format!("{}.{extension}", input.name));

        match tokio::fs::write(&path, input.content.as_bytes()).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = input.content.len(), "File written");
                ToolOutput::file_path(&path)
            }
            Err(e) => ToolOutput::error(format!("Failed to write {}: {e}", path.display())),
        }
    }
}
