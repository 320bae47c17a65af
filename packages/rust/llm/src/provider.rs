use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taxrates_shared::Result;

/// One generation request, independent of the backend.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: None,
            temperature: 0.1,
            max_tokens: None,
            stream: false,
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Token counters reported by backends that expose them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Outcome of a request that reached the backend.
///
/// Transport failures and non-2xx answers are returned as errors instead, so
/// the retry layer can classify them; `success == false` means the backend
/// answered but produced nothing usable.
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub content: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// A response carrying `content`; empty content is reported as a failure.
    pub fn from_content(
        provider: &str,
        model: &str,
        content: String,
        token_usage: Option<TokenUsage>,
    ) -> Self {
        let success = !content.trim().is_empty();
        Self {
            error: (!success).then(|| "empty response content".to_string()),
            content,
            success,
            provider: provider.to_string(),
            model: model.to_string(),
            token_usage,
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry name (`ollama`, `openai`).
    fn name(&self) -> &str;

    /// Whether the backend is reachable and configured. Never errors.
    async fn is_available(&self) -> bool;

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse>;

    async fn list_models(&self) -> Result<Vec<String>>;

    /// Whether a model name by convention belongs to this backend.
    fn claims_model(&self, _model: &str) -> bool {
        false
    }
}
