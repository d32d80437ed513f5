//! Events that drive a turn

use crate::db::{MessageContent, ToolResultContent};
use crate::llm::LlmErrorKind;
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    UserInput {
        text: String,
    },

    /// The model produced an assistant message
    ModelResponse {
        message: MessageContent,
    },
    ModelError {
        message: String,
        kind: LlmErrorKind,
        retry_after: Option<Duration>,
    },
    /// A scheduled retry delay elapsed
    RetryTimeout {
        attempt: u32,
    },

    /// All calls of the current batch finished, in request order
    ToolsDispatched {
        results: Vec<ToolResultContent>,
    },
}
