//! Turn executor: one model call over the running history

use super::traits::LlmClient;
use crate::db::{MessageContent, ToolCallRequest};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmResponse, StopReason, ToolDefinition,
};
use crate::tools::ToolSpec;
use serde_json::Value;

/// Sampling temperature used for agent turns
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Calls the model once per `run_turn`; retries are the state machine's job
pub struct TurnExecutor<L> {
    llm: L,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl<L: LlmClient> TurnExecutor<L> {
    pub fn new(llm: L, temperature: f32) -> Self {
        Self {
            llm,
            temperature,
            max_tokens: Some(8192),
        }
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// Send the history and tool catalogue, returning the assistant message
    pub async fn run_turn(
        &self,
        history: &[MessageContent],
        tools: &[ToolSpec],
    ) -> Result<MessageContent, LlmError> {
        let request = build_request(history, tools, self.temperature, self.max_tokens);
        let response = self.llm.complete(&request).await?;
        if response.stop_reason == StopReason::MaxTokens {
            tracing::warn!(model = %self.llm.model_id(), "Model reply truncated at max tokens");
        }
        let message = response_to_message(&response);
        tracing::debug!(
            model = %self.llm.model_id(),
            stop_reason = response.stop_reason.as_str(),
            tool_use = message.has_tool_calls(),
            "Model responded"
        );
        Ok(message)
    }
}

/// Translate stored history into a provider-neutral request.
///
/// System messages become the system instruction. Consecutive tool results
/// share one user message, the shape both providers expect after a batch.
pub(crate) fn build_request(
    history: &[MessageContent],
    tools: &[ToolSpec],
    temperature: f32,
    max_tokens: Option<u32>,
) -> LlmRequest {
    let mut system = Vec::new();
    let mut messages: Vec<LlmMessage> = Vec::new();

    for content in history {
        match content {
            MessageContent::System { content } => system.push(content.as_str()),

            MessageContent::Human { content } => {
                messages.push(LlmMessage::user(vec![ContentBlock::text(content)]));
            }

            MessageContent::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                if !content.is_empty() {
                    blocks.push(ContentBlock::text(content));
                }
                blocks.extend(tool_calls.iter().map(|call| {
                    ContentBlock::tool_use(
                        &call.call_id,
                        &call.tool_name,
                        Value::Object(call.arguments.clone()),
                    )
                }));

                // Providers reject empty turns
                if !blocks.is_empty() {
                    messages.push(LlmMessage::assistant(blocks));
                }
            }

            MessageContent::ToolResult(result) => {
                let block = ContentBlock::tool_result(
                    &result.call_id,
                    &result.tool_name,
                    &result.content,
                    result.is_error,
                );
                match messages.last_mut() {
                    Some(last) if last.carries_tool_results() => last.content.push(block),
                    _ => messages.push(LlmMessage::user(vec![block])),
                }
            }
        }
    }

    LlmRequest {
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        tools: tools
            .iter()
            .map(|spec| ToolDefinition {
                name: spec.name.clone(),
                description: spec.description.clone(),
                input_schema: spec.parameter_schema.clone(),
            })
            .collect(),
        max_tokens,
        temperature: Some(temperature),
    }
}

/// Convert a provider response into an assistant message.
///
/// Calls without an id (Gemini may omit them) get a generated `call_<uuid>`.
pub(crate) fn response_to_message(response: &LlmResponse) -> MessageContent {
    let calls = response
        .tool_uses()
        .into_iter()
        .map(|call| {
            let call_id = if call.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4())
            } else {
                call.id.to_string()
            };
            let arguments = call.input.as_object().cloned().unwrap_or_default();
            ToolCallRequest::new(call_id, call.name, arguments)
        })
        .collect();

    MessageContent::assistant(response.text(), calls)
}
