//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::db::{Database, Message, MessageContent};
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelRegistry};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Durable per-session message log
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append messages as the new tail of the session, all or nothing
    async fn append(
        &self,
        session_id: &str,
        messages: &[MessageContent],
    ) -> Result<Vec<Message>, String>;

    /// Full history, oldest first; empty for an unknown session
    async fn read(&self, session_id: &str) -> Result<Vec<Message>, String>;

    /// Ids of every session with at least one append
    async fn list_sessions(&self) -> Result<BTreeSet<String>, String>;

    /// Create a session seeded with its system message
    async fn create_session(&self, session_id: &str, system_prompt: &str) -> Result<(), String>;

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), String>;
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn append(
        &self,
        session_id: &str,
        messages: &[MessageContent],
    ) -> Result<Vec<Message>, String> {
        (**self).append(session_id, messages).await
    }

    async fn read(&self, session_id: &str) -> Result<Vec<Message>, String> {
        (**self).read(session_id).await
    }

    async fn list_sessions(&self) -> Result<BTreeSet<String>, String> {
        (**self).list_sessions().await
    }

    async fn create_session(&self, session_id: &str, system_prompt: &str) -> Result<(), String> {
        (**self).create_session(session_id, system_prompt).await
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), String> {
        (**self).set_title(session_id, title).await
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `MessageStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn append(
        &self,
        session_id: &str,
        messages: &[MessageContent],
    ) -> Result<Vec<Message>, String> {
        self.db
            .append_messages(session_id, messages)
            .map_err(|e| e.to_string())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<Message>, String> {
        self.db.get_messages(session_id).map_err(|e| e.to_string())
    }

    async fn list_sessions(&self) -> Result<BTreeSet<String>, String> {
        self.db.list_sessions().map_err(|e| e.to_string())
    }

    async fn create_session(&self, session_id: &str, system_prompt: &str) -> Result<(), String> {
        self.db
            .create_session(session_id, system_prompt)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), String> {
        self.db
            .set_title(session_id, title)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let llm = self
            .registry
            .get(&self.model_id)
            .or_else(|| self.registry.default())
            .ok_or_else(|| {
                LlmError::auth(format!(
                    "No model available; set {}",
                    ModelRegistry::missing_key_hint()
                ))
            })?;
        llm.complete(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_storage_round_trip() {
        let storage = DatabaseStorage::new(Database::open_in_memory().unwrap());
        storage.create_session("s-1", "rules").await.unwrap();
        storage
            .append("s-1", &[MessageContent::human("hi")])
            .await
            .unwrap();

        let history = storage.read("s-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content.text(), "hi");
        assert!(storage.list_sessions().await.unwrap().contains("s-1"));
        assert!(storage.read("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_client_without_models_is_auth_error() {
        let client = RegistryLlmClient::new(
            Arc::new(ModelRegistry::new_empty()),
            "gemini-2.5-flash".to_string(),
        );
        let err = client
            .complete(&LlmRequest::prompt("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::llm::LlmErrorKind::Auth);
        assert!(!err.kind.is_retryable());
    }
}
