//! Property-based tests for the turn state machine
//!
//! A scripted model drives complete turns through `transition`, executing
//! effects in memory the way the runtime does.

use super::*;
use crate::db::{MessageContent, ResultKind, Role, ToolCallRequest, ToolResultContent};
use crate::llm::LlmErrorKind;
use proptest::prelude::*;
use serde_json::Map;

/// One scripted model outcome
#[derive(Debug, Clone)]
enum Step {
    Reply { calls: usize },
    Fail { kind: LlmErrorKind },
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (0usize..4).prop_map(|calls| Step::Reply { calls }),
        1 => arb_error_kind().prop_map(|kind| Step::Fail { kind }),
    ]
}

/// Outcome of driving one turn
struct Run {
    final_state: TurnState,
    committed: Vec<MessageContent>,
    model_calls: u32,
    dispatches: u32,
}

fn drive(script: &[Step], context: &TurnContext) -> Run {
    let mut state = TurnState::AwaitingInput;
    let mut staged = Vec::new();
    let mut committed = Vec::new();
    let mut queue = vec![Event::UserInput {
        text: "go".to_string(),
    }];
    let mut steps = script.iter().cycle();
    let mut model_calls = 0;
    let mut dispatches = 0;
    let mut call_seq = 0;

    while let Some(event) = queue.pop() {
        let result = transition(&state, context, event).expect("scripted events are valid");
        state = result.new_state;

        for effect in result.effects {
            match effect {
                Effect::RecordMessage { content } => staged.push(content),
                Effect::CommitMessages => committed.append(&mut staged),
                Effect::DiscardPending => staged.clear(),
                Effect::RequestModel => {
                    model_calls += 1;
                    let event = match steps.next() {
                        Some(Step::Fail { kind }) => Event::ModelError {
                            message: "scripted failure".to_string(),
                            kind: *kind,
                            retry_after: None,
                        },
                        Some(Step::Reply { calls }) => {
                            let calls = (0..*calls)
                                .map(|_| {
                                    call_seq += 1;
                                    ToolCallRequest::new(format!("c{call_seq}"), "add", Map::new())
                                })
                                .collect();
                            Event::ModelResponse {
                                message: MessageContent::assistant("", calls),
                            }
                        }
                        None => Event::ModelResponse {
                            message: MessageContent::assistant("", vec![]),
                        },
                    };
                    queue.push(event);
                }
                Effect::DispatchTools { calls } => {
                    dispatches += 1;
                    let results = calls
                        .iter()
                        .map(|c| ToolResultContent {
                            call_id: c.call_id.clone(),
                            tool_name: c.tool_name.clone(),
                            content: "ok".to_string(),
                            is_error: false,
                            kind: ResultKind::Text,
                        })
                        .collect();
                    queue.push(Event::ToolsDispatched { results });
                }
                Effect::ScheduleRetry { attempt, .. } => {
                    queue.push(Event::RetryTimeout { attempt });
                }
            }
        }
    }

    Run {
        final_state: state,
        committed,
        model_calls,
        dispatches,
    }
}

/// Every assistant tool call is answered, in order, by the messages that follow it
fn assert_paired(log: &[MessageContent]) -> Result<(), TestCaseError> {
    let mut i = 0;
    while i < log.len() {
        let calls = log[i].tool_calls();
        for (offset, call) in calls.iter().enumerate() {
            match log.get(i + 1 + offset) {
                Some(MessageContent::ToolResult(r)) => {
                    prop_assert_eq!(&r.call_id, &call.call_id);
                }
                other => {
                    prop_assert!(false, "call {} unanswered, found {:?}", call.call_id, other);
                }
            }
        }
        i += 1 + calls.len();
    }
    Ok(())
}

proptest! {
    #[test]
    fn turn_always_terminates(
        script in prop::collection::vec(arb_step(), 1..40),
        max_iterations in 1u32..8,
        max_attempts in 1u32..4,
    ) {
        let context = TurnContext::new("p").with_limits(max_iterations, max_attempts);
        let run = drive(&script, &context);
        prop_assert!(run.final_state.is_terminal());
    }

    #[test]
    fn iteration_cap_is_never_exceeded(
        script in prop::collection::vec(arb_step(), 1..40),
        max_iterations in 1u32..8,
    ) {
        let context = TurnContext::new("p").with_limits(max_iterations, 1);
        let run = drive(&script, &context);
        prop_assert!(run.model_calls <= max_iterations);
        prop_assert!(run.dispatches < max_iterations);
    }

    #[test]
    fn committed_log_keeps_pairing(
        script in prop::collection::vec(arb_step(), 1..40),
        max_iterations in 1u32..8,
        max_attempts in 1u32..4,
    ) {
        let context = TurnContext::new("p").with_limits(max_iterations, max_attempts);
        let run = drive(&script, &context);

        assert_paired(&run.committed)?;
        if let Some(first) = run.committed.first() {
            prop_assert_eq!(first.role(), Role::Human);
        }
        if run.final_state == TurnState::Done {
            let last = run.committed.last().expect("done turn commits");
            prop_assert_eq!(last.role(), Role::Assistant);
            prop_assert!(!last.has_tool_calls());
        }
    }

    #[test]
    fn always_tools_hits_cap_exactly(max_iterations in 1u32..30) {
        let context = TurnContext::new("p").with_limits(max_iterations, 1);
        let run = drive(&[Step::Reply { calls: 1 }], &context);

        prop_assert_eq!(
            run.final_state,
            TurnState::Aborted { reason: AbortReason::IterationLimit { limit: max_iterations } }
        );
        prop_assert_eq!(run.model_calls, max_iterations);
        prop_assert_eq!(run.dispatches, max_iterations - 1);
    }

    #[test]
    fn abort_before_first_commit_persists_nothing(kind in arb_error_kind()) {
        let context = TurnContext::new("p").with_limits(25, 1);
        let run = drive(&[Step::Fail { kind }], &context);
        let is_backend_abort = matches!(
            run.final_state,
            TurnState::Aborted { reason: AbortReason::ModelBackend { .. } }
        );
        prop_assert!(is_backend_abort);
        prop_assert!(run.committed.is_empty());
    }
}
