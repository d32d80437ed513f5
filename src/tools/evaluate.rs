//! Single-expression calculator

use super::expr::{self, format_number};
use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct EvaluateTool;

#[derive(Debug, Deserialize)]
struct EvaluateInput {
    string: String,
}

#[async_trait]
impl Tool for EvaluateTool {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn description(&self) -> String {
        "Evaluate a single arithmetic expression and return the result. Supports \
         + - * / // % ** (or ^), parentheses, the constants pi, e, tau and inf, \
         and math functions such as sqrt, sin, log, floor, round, min and max \
         (optionally written with a math. prefix). Not for multi-line code."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["string"],
            "properties": {
                "string": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. \"sqrt(2) * 3\""
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: EvaluateInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        match expr::evaluate(&input.string) {
            Ok(value) => ToolOutput::success(format_number(value)),
            Err(e) => ToolOutput::error(format!("Error evaluating expression: {e}")),
        }
    }
}
