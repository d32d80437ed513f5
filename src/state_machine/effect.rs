//! Effects produced by state transitions

use crate::db::{MessageContent, ToolCallRequest};
use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Stage a message for the next commit
    RecordMessage { content: MessageContent },

    /// Append all staged messages to the store in one write
    CommitMessages,

    /// Drop staged messages that were never committed
    DiscardPending,

    /// Call the model with the current history
    RequestModel,

    /// Run the tool calls, producing one result per call
    DispatchTools { calls: Vec<ToolCallRequest> },

    /// Wait, then deliver `Event::RetryTimeout`
    ScheduleRetry { delay: Duration, attempt: u32 },
}

impl Effect {
    pub fn record(content: MessageContent) -> Self {
        Effect::RecordMessage { content }
    }
}
