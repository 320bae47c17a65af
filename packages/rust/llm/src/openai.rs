//! OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use taxrates_shared::http::{ensure_success, transport_error};
use taxrates_shared::{Result, TaxRatesError};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};

const USER_AGENT: &str = concat!("taxrates/", env!("CARGO_PKG_VERSION"));

const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

/// Model prefixes routed here by the registry's auto selection.
const CLAIMED_PREFIXES: [&str; 4] = ["gpt-", "o1", "o3", "o4"];

/// Reasoning models take `max_completion_tokens` and reject `temperature`.
const REASONING_PREFIXES: [&str; 4] = ["gpt-5", "o1", "o3", "o4"];

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelPage {
    #[serde(default)]
    data: Vec<ModelId>,
}

#[derive(Deserialize)]
struct ModelId {
    id: String,
}

fn is_reasoning_model(model: &str) -> bool {
    REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Provider for the hosted chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub const NAME: &'static str = "openai";

    /// A provider without a key registers fine but reports itself unavailable.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TaxRatesError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| TaxRatesError::config("OpenAI API key is not set"))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        let reasoning = is_reasoning_model(&request.model);
        let body = CompletionBody {
            model: &request.model,
            messages,
            temperature: (!reasoning).then_some(request.temperature),
            max_tokens: request.max_tokens.filter(|_| !reasoning),
            max_completion_tokens: request.max_tokens.filter(|_| reasoning),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let completion: Completion = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| TaxRatesError::parse(format!("{url}: invalid completion: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), reasoning, "completion received");

        Ok(LlmResponse::from_content(
            Self::NAME,
            &request.model,
            content,
            completion.usage,
        ))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let key = self.api_key()?;
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .timeout(MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let page: ModelPage = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| TaxRatesError::parse(format!("{url}: {e}")))?;
        Ok(page.data.into_iter().map(|m| m.id).collect())
    }

    fn claims_model(&self, model: &str) -> bool {
        CLAIMED_PREFIXES.iter().any(|p| model.starts_with(p))
    }
}
