//! Pure state transition function

use super::{AbortReason, Effect, Event, TurnContext, TurnState};
use crate::db::{MessageContent, ToolCallRequest, ToolResultContent};
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("A turn is already in progress for this session")]
    TurnInProgress,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
#[allow(clippy::too_many_lines)] // One arm per (state, event) pair
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User input
        // ============================================================
        (TurnState::AwaitingInput, Event::UserInput { text }) => Ok(TransitionResult::new(
            TurnState::ModelTurn {
                iteration: 1,
                attempt: 1,
            },
        )
        .with_effect(Effect::record(MessageContent::human(text)))
        .with_effect(Effect::RequestModel)),

        (TurnState::ModelTurn { .. } | TurnState::DispatchTools { .. }, Event::UserInput { .. }) => {
            Err(TransitionError::TurnInProgress)
        }

        // ============================================================
        // Model responses
        // ============================================================
        (TurnState::ModelTurn { iteration, .. }, Event::ModelResponse { message }) => {
            let MessageContent::Assistant { tool_calls, .. } = &message else {
                return Err(TransitionError::InvalidTransition(format!(
                    "model produced a {} message",
                    message.role()
                )));
            };

            if tool_calls.is_empty() {
                return Ok(TransitionResult::new(TurnState::Done)
                    .with_effect(Effect::record(message))
                    .with_effect(Effect::CommitMessages));
            }

            if *iteration >= context.max_iterations {
                return Ok(TransitionResult::new(TurnState::Aborted {
                    reason: AbortReason::IterationLimit {
                        limit: context.max_iterations,
                    },
                })
                .with_effect(Effect::DiscardPending));
            }

            let calls = tool_calls.clone();
            Ok(TransitionResult::new(TurnState::DispatchTools {
                iteration: *iteration,
                calls: calls.clone(),
            })
            .with_effect(Effect::record(message))
            .with_effect(Effect::DispatchTools { calls }))
        }

        // ============================================================
        // Model errors and retry
        // ============================================================
        (
            TurnState::ModelTurn { iteration, attempt },
            Event::ModelError {
                kind, retry_after, ..
            },
        ) if kind.is_retryable() && *attempt < context.max_model_attempts => {
            let next = attempt + 1;
            let delay = retry_after.unwrap_or_else(|| retry_delay(next));
            Ok(TransitionResult::new(TurnState::ModelTurn {
                iteration: *iteration,
                attempt: next,
            })
            .with_effect(Effect::ScheduleRetry {
                delay,
                attempt: next,
            }))
        }

        (TurnState::ModelTurn { attempt, .. }, Event::ModelError { message, kind, .. }) => {
            let message = if kind.is_retryable() {
                format!("Failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(TransitionResult::new(TurnState::Aborted {
                reason: AbortReason::ModelBackend { message, kind },
            })
            .with_effect(Effect::DiscardPending))
        }

        (TurnState::ModelTurn { iteration, attempt }, Event::RetryTimeout { attempt: fired })
            if *attempt == fired =>
        {
            Ok(TransitionResult::new(TurnState::ModelTurn {
                iteration: *iteration,
                attempt: *attempt,
            })
            .with_effect(Effect::RequestModel))
        }

        // ============================================================
        // Tool results
        // ============================================================
        (TurnState::DispatchTools { iteration, calls }, Event::ToolsDispatched { results }) => {
            check_pairing(calls, &results)?;
            Ok(TransitionResult::new(TurnState::ModelTurn {
                iteration: iteration + 1,
                attempt: 1,
            })
            .with_effects(
                results
                    .into_iter()
                    .map(|r| Effect::record(MessageContent::tool_result(r))),
            )
            .with_effect(Effect::CommitMessages)
            .with_effect(Effect::RequestModel))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} cannot handle {}",
            state.name(),
            event_name(&event)
        ))),
    }
}

/// Every call gets exactly one result, in request order
fn check_pairing(
    calls: &[ToolCallRequest],
    results: &[ToolResultContent],
) -> Result<(), TransitionError> {
    if calls.len() != results.len() {
        return Err(TransitionError::InvalidTransition(format!(
            "expected {} tool results, got {}",
            calls.len(),
            results.len()
        )));
    }
    for (call, result) in calls.iter().zip(results) {
        if call.call_id != result.call_id {
            return Err(TransitionError::InvalidTransition(format!(
                "tool result {} does not answer call {}",
                result.call_id, call.call_id
            )));
        }
    }
    Ok(())
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::UserInput { .. } => "user_input",
        Event::ModelResponse { .. } => "model_response",
        Event::ModelError { .. } => "model_error",
        Event::RetryTimeout { .. } => "retry_timeout",
        Event::ToolsDispatched { .. } => "tools_dispatched",
    }
}

/// Exponential backoff: 1s, 2s, 4s, ...
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(2).min(6))
}
