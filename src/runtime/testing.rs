//! Mock implementations for testing
//!
//! These mocks enable runtime tests without real I/O.

use super::traits::{LlmClient, MessageStore};
use crate::db::{Message, MessageContent, ToolCallRequest};
use crate::llm::{ContentBlock, LlmError, LlmRequest, LlmResponse, StopReason, Usage};
use crate::tools::{Tool, ToolConfirmer, ToolContext, ToolOutput, ToolSpec};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    /// Response requesting the given `(id, tool, input)` calls
    pub fn tool_response(calls: &[(&str, &str, Value)]) -> LlmResponse {
        LlmResponse {
            content: calls
                .iter()
                .map(|(id, name, input)| ContentBlock::tool_use(*id, *name, input.clone()))
                .collect(),
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::invalid_request("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// `MessageStore` kept in memory, with switchable write failures
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<BTreeMap<String, Vec<Message>>>,
    titles: Mutex<BTreeMap<String, String>>,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later append fail
    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    pub fn contents(&self, session_id: &str) -> Vec<MessageContent> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|msgs| msgs.iter().map(|m| m.content.clone()).collect())
            .unwrap_or_default()
    }

    pub fn title(&self, session_id: &str) -> Option<String> {
        self.titles.lock().unwrap().get(session_id).cloned()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        session_id: &str,
        messages: &[MessageContent],
    ) -> Result<Vec<Message>, String> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut sessions = self.sessions.lock().unwrap();
        let log = sessions.entry(session_id.to_string()).or_default();
        let now = Utc::now();
        let mut stored = Vec::with_capacity(messages.len());
        for content in messages {
            let message = Message {
                message_id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                sequence_id: log.last().map_or(1, |m| m.sequence_id + 1),
                content: content.clone(),
                created_at: now,
            };
            log.push(message.clone());
            stored.push(message);
        }
        Ok(stored)
    }

    async fn read(&self, session_id: &str) -> Result<Vec<Message>, String> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<BTreeSet<String>, String> {
        Ok(self.sessions.lock().unwrap().keys().cloned().collect())
    }

    async fn create_session(&self, session_id: &str, system_prompt: &str) -> Result<(), String> {
        let exists = self.sessions.lock().unwrap().contains_key(session_id);
        if exists {
            return Err(format!("session {session_id} already exists"));
        }
        self.append(session_id, &[MessageContent::system(system_prompt)])
            .await
            .map(|_| ())
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), String> {
        self.titles
            .lock()
            .unwrap()
            .insert(session_id.to_string(), title.to_string());
        Ok(())
    }
}

// ============================================================================
// Confirmers and tools
// ============================================================================

/// Confirmer with a fixed answer that records which tools it was asked about
pub struct RecordingConfirmer {
    approve: bool,
    asked: Mutex<Vec<String>>,
}

impl RecordingConfirmer {
    pub fn new(approve: bool) -> Self {
        Self {
            approve,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolConfirmer for RecordingConfirmer {
    async fn confirm(&self, _session_id: &str, spec: &ToolSpec, _request: &ToolCallRequest) -> bool {
        self.asked.lock().unwrap().push(spec.name.clone());
        self.approve
    }
}

/// Tool that always panics
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn description(&self) -> String {
        "Panics when run".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, _ctx: ToolContext) -> ToolOutput {
        panic!("tool exploded");
    }
}
