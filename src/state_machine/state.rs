//! Turn state types

use crate::db::ToolCallRequest;
use crate::llm::LlmErrorKind;

/// Default cap on model calls per turn
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Default number of attempts per model call
pub const DEFAULT_MAX_MODEL_ATTEMPTS: u32 = 3;

/// State of a single turn, from user input to termination
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnState {
    /// Ready for user input
    #[default]
    AwaitingInput,

    /// Model request in flight. `iteration` counts model calls in this turn
    /// (1-based); `attempt` counts retries of the current call.
    ModelTurn { iteration: u32, attempt: u32 },

    /// Executing the tool calls of the latest assistant message
    DispatchTools {
        iteration: u32,
        calls: Vec<ToolCallRequest>,
    },

    /// The model answered without tool calls
    Done,

    /// Turn ended with an error surfaced to the caller
    Aborted { reason: AbortReason },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Aborted { .. })
    }

    /// Short label for logging
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::AwaitingInput => "awaiting_input",
            TurnState::ModelTurn { .. } => "model_turn",
            TurnState::DispatchTools { .. } => "dispatch_tools",
            TurnState::Done => "done",
            TurnState::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    ModelBackend { message: String, kind: LlmErrorKind },
    IterationLimit { limit: u32 },
}

/// Immutable configuration for one turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: String,
    pub max_iterations: u32,
    pub max_model_attempts: u32,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_model_attempts: DEFAULT_MAX_MODEL_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, max_iterations: u32, max_model_attempts: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self.max_model_attempts = max_model_attempts.max(1);
        self
    }
}
