//! Model registry for managing available LLM providers

use super::models::DEFAULT_MODEL_ID;
use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Override for the Gemini endpoint (e.g. a local proxy)
    pub gemini_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("api")),
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            gemini_base_url: non_empty_env("GEMINI_BASE_URL"),
            anthropic_base_url: non_empty_env("ANTHROPIC_BASE_URL"),
            default_model: non_empty_env("DEFAULT_MODEL"),
        }
    }

    fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }

    fn base_url(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini_base_url.as_deref(),
            Provider::Anthropic => self.anthropic_base_url.as_deref(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Model metadata exposed over the API
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    #[cfg(test)]
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: "test-model".to_string(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let default_model = config
            .default_model
            .clone()
            .or_else(|| {
                if services.contains_key(DEFAULT_MODEL_ID) {
                    Some(DEFAULT_MODEL_ID.to_string())
                } else {
                    // First available in definition order
                    all_models()
                        .iter()
                        .find(|m| services.contains_key(m.id))
                        .map(|m| m.id.to_string())
                }
            })
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Try to create a model service, validating prerequisites
    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        let api_key = config.api_key(model_def.provider)?;

        match (model_def.factory)(api_key, config.base_url(model_def.provider)) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::warn!(model = model_def.id, error = %e, "Failed to create model service");
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Get detailed information about available models
    pub fn available_model_info(&self) -> Vec<ModelInfo> {
        all_models()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .map(|def| ModelInfo {
                id: def.id.to_string(),
                provider: def.provider.display_name().to_string(),
                description: def.description.to_string(),
            })
            .collect()
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// Environment variables that would enable at least one model
    pub fn missing_key_hint() -> String {
        let mut vars: Vec<_> = all_models()
            .iter()
            .map(|m| m.provider.api_key_env_var())
            .collect();
        vars.dedup();
        vars.join(" or ")
    }

    /// Get a cheap/fast model for auxiliary tasks like title generation.
    pub fn get_cheap_model(&self) -> Option<Arc<dyn LlmService>> {
        const CHEAP_MODELS: &[&str] = &["gemini-2.5-flash", "claude-4.5-haiku"];

        CHEAP_MODELS
            .iter()
            .find_map(|id| self.get(id))
            .or_else(|| self.default())
    }
}
