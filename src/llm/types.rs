//! Provider-neutral request and response shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completion request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// System instruction; several system messages are joined with blank lines
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// A single user prompt with no tools
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![LlmMessage::user(vec![ContentBlock::text(text)])],
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl LlmMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// True for a user message made only of tool results
    pub fn carries_tool_results(&self) -> bool {
        self.role == MessageRole::User
            && !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        /// Gemini keys function responses by name, so results carry it along
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            name: name.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, ContentBlock::Text { text } if text.is_empty())
    }
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Finished its answer
    #[default]
    EndTurn,
    /// Stopped to wait for tool results
    ToolUse,
    /// Hit the output token limit
    MaxTokens,
    /// Safety filter, recitation or anything unrecognised
    Other,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Borrowed view of one tool call in a response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolUse<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a Value,
}

impl LlmResponse {
    pub fn tool_uses(&self) -> Vec<ToolUse<'_>> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
                _ => None,
            })
            .collect()
    }

    /// All text blocks, concatenated
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_helpers() {
        let response = LlmResponse {
            content: vec![
                ContentBlock::text("Let me "),
                ContentBlock::tool_use("call-1", "add", json!({"a": 1, "b": 2})),
                ContentBlock::text("check."),
            ],
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        };

        assert_eq!(response.text(), "Let me check.");
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].id, "call-1");
        assert_eq!(uses[0].name, "add");
        assert_eq!(uses[0].input["b"], 2);
    }

    #[test]
    fn test_carries_tool_results() {
        let results = LlmMessage::user(vec![ContentBlock::tool_result("c1", "add", "3", false)]);
        assert!(results.carries_tool_results());

        let mixed = LlmMessage::user(vec![
            ContentBlock::tool_result("c1", "add", "3", false),
            ContentBlock::text("and?"),
        ]);
        assert!(!mixed.carries_tool_results());
        assert!(!LlmMessage::user(vec![]).carries_tool_results());
        assert!(!LlmMessage::assistant(vec![ContentBlock::text("hi")]).carries_tool_results());
    }

    #[test]
    fn test_prompt_request() {
        let request = LlmRequest::prompt("title this");
        assert!(request.system.is_none());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, MessageRole::User);
        assert!(request.tools.is_empty());
    }
}
