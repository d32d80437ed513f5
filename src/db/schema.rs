//! Database schema and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (session_id, sequence_id),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, sequence_id);
";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Assistant,
    ToolResult,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Human => write!(f, "human"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// How a tool result value should be interpreted by a presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    #[default]
    Text,
    Json,
    FilePath,
    ImagePath,
}

/// Payload of a `tool_result` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub kind: ResultKind,
}

impl ToolResultContent {
    /// Error result with text content
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error: true,
            kind: ResultKind::Text,
        }
    }
}

/// Typed message content, discriminated by role.
///
/// Role-specific fields live on their variant, so an assistant message is the
/// only place tool calls can appear and a tool result always names its call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageContent {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult(ToolResultContent),
}

impl MessageContent {
    pub fn system(content: impl Into<String>) -> Self {
        MessageContent::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        MessageContent::Human {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        MessageContent::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(result: ToolResultContent) -> Self {
        MessageContent::ToolResult(result)
    }

    pub fn role(&self) -> Role {
        match self {
            MessageContent::System { .. } => Role::System,
            MessageContent::Human { .. } => Role::Human,
            MessageContent::Assistant { .. } => Role::Assistant,
            MessageContent::ToolResult(_) => Role::ToolResult,
        }
    }

    /// Text content of the message
    pub fn text(&self) -> &str {
        match self {
            MessageContent::System { content }
            | MessageContent::Human { content }
            | MessageContent::Assistant { content, .. } => content,
            MessageContent::ToolResult(result) => &result.content,
        }
    }

    /// Tool calls requested by this message (empty unless assistant)
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            MessageContent::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

/// A persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub sequence_id: i64,
    #[serde(flatten)]
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.content.role()
    }
}

/// Session listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_content_tagged_by_role() {
        let msg = MessageContent::assistant(
            "",
            vec![ToolCallRequest::new(
                "call-1",
                "add",
                json!({"a": 2, "b": 3}).as_object().cloned().unwrap(),
            )],
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["tool_name"], "add");

        let back: MessageContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_tool_result_defaults() {
        let value = json!({
            "role": "tool_result",
            "call_id": "call-1",
            "tool_name": "add",
            "content": "5"
        });
        let msg: MessageContent = serde_json::from_value(value).unwrap();
        match msg {
            MessageContent::ToolResult(result) => {
                assert!(!result.is_error);
                assert_eq!(result.kind, ResultKind::Text);
            }
            other => panic!("Expected tool result, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_assistant_omits_tool_calls() {
        let value = serde_json::to_value(MessageContent::assistant("hi", vec![])).unwrap();
        assert!(value.get("tool_calls").is_none());
        assert_eq!(MessageContent::assistant("hi", vec![]).role(), Role::Assistant);
    }
}
