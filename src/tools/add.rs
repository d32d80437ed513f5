//! Integer addition

use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct AddTool;

#[derive(Debug, Deserialize)]
struct AddInput {
    a: i64,
    b: i64,
}

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &'static str {
        "add"
    }

    fn description(&self) -> String {
        "Add two integers and return the sum.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "a": {"type": "integer", "description": "First addend"},
                "b": {"type": "integer", "description": "Second addend"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: AddInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        match input.a.checked_add(input.b) {
            Some(sum) => ToolOutput::success(sum.to_string()),
            None => ToolOutput::error(format!("Integer overflow adding {} and {}", input.a, input.b)),
        }
    }
}
