//! Centralized model definitions for all LLM providers

use super::anthropic::AnthropicModel;
use super::gemini::GeminiModel;
use super::{AnthropicService, GeminiService, LlmService};
use std::sync::Arc;

/// Model used when `DEFAULT_MODEL` is unset
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    Anthropic,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gemini => "Google Gemini",
            Provider::Anthropic => "Anthropic",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

type ServiceFactory = fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gemini-2.5-flash")
    pub id: &'static str,
    pub provider: Provider,
    /// Human-readable description
    pub description: &'static str,
    /// Builds the service from an API key and optional base URL override
    pub factory: ServiceFactory,
}

fn gemini(
    model: GeminiModel,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires GEMINI_API_KEY", model.api_name()));
    }
    GeminiService::new(api_key.to_string(), model, base_url)
        .map(|s| Arc::new(s) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

fn anthropic(
    model: AnthropicModel,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires ANTHROPIC_API_KEY", model.model_id()));
    }
    AnthropicService::new(api_key.to_string(), model, base_url)
        .map(|s| Arc::new(s) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gemini-2.5-flash",
            provider: Provider::Gemini,
            description: "Gemini 2.5 Flash (fast, default)",
            factory: |key, base| gemini(GeminiModel::Gemini25Flash, key, base),
        },
        ModelDef {
            id: "gemini-2.5-pro",
            provider: Provider::Gemini,
            description: "Gemini 2.5 Pro (more capable, slower)",
            factory: |key, base| gemini(GeminiModel::Gemini25Pro, key, base),
        },
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced performance)",
            factory: |key, base| anthropic(AnthropicModel::ClaudeSonnet45, key, base),
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, efficient)",
            factory: |key, base| anthropic(AnthropicModel::ClaudeHaiku45, key, base),
        },
    ]
}
