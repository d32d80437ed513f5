//! String reversal

use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ReverseTool;

#[derive(Debug, Deserialize)]
struct ReverseInput {
    string: String,
}

#[async_trait]
impl Tool for ReverseTool {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn description(&self) -> String {
        "Reverse a string character by character.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["string"],
            "properties": {
                "string": {"type": "string", "description": "Text to reverse"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        match parse_input::<ReverseInput>(input) {
            Ok(input) => ToolOutput::success(input.string.chars().rev().collect::<String>()),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn test_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReverseTool
            .run(json!({"string": "hello"}), test_context(dir.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "olleh");
    }

    #[tokio::test]
    async fn test_reverse_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReverseTool
            .run(json!({"string": "añb"}), test_context(dir.path()))
            .await;
        assert_eq!(result.output, "bña");
    }

    #[tokio::test]
    async fn test_reverse_missing_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReverseTool.run(json!({}), test_context(dir.path())).await;
        assert!(!result.success);
    }
}
