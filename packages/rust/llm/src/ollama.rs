//! Local chat-style endpoint (`POST /chat`, `GET /health`, `GET /models`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use taxrates_shared::http::{ensure_success, transport_error};
use taxrates_shared::{Result, TaxRatesError};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};

const USER_AGENT: &str = concat!("taxrates/", env!("CARGO_PKG_VERSION"));

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    #[serde(default)]
    name: String,
}

/// Provider for the local chat endpoint.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub const NAME: &'static str = "ollama";

    /// `timeout` bounds generation calls; health and model listing use
    /// their own short ceilings.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TaxRatesError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn usage(reply: &ChatReply) -> Option<TokenUsage> {
    let prompt = reply.prompt_eval_count?;
    let completion = reply.eval_count?;
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    })
}

/// Join the message fragments of an NDJSON stream. The last line carrying
/// counters provides the usage.
fn join_stream(body: &str) -> Result<(String, Option<TokenUsage>)> {
    let mut content = String::new();
    let mut token_usage = None;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let reply: ChatReply = serde_json::from_str(line)
            .map_err(|e| TaxRatesError::parse(format!("invalid stream line: {e}")))?;
        if let Some(message) = &reply.message {
            content.push_str(&message.content);
        }
        token_usage = usage(&reply).or(token_usage);
    }
    Ok((content, token_usage))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn is_available(&self) -> bool {
        let url = self.url("/health");
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %url, error = %e, "health check failed");
                false
            }
        }
    }

    #[instrument(skip_all, fields(model = %request.model, stream = request.stream))]
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let url = self.url("/chat");

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatBody {
            model: &request.model,
            messages,
            stream: request.stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let response = ensure_success(&url, response).await?;
        let text = response.text().await.map_err(|e| transport_error(&url, e))?;

        let (content, token_usage) = if request.stream {
            join_stream(&text)?
        } else {
            let reply: ChatReply = serde_json::from_str(&text)
                .map_err(|e| TaxRatesError::parse(format!("{url}: invalid chat reply: {e}")))?;
            let usage = usage(&reply);
            (reply.message.map(|m| m.content).unwrap_or_default(), usage)
        };

        debug!(chars = content.len(), "chat reply received");
        Ok(LlmResponse::from_content(
            Self::NAME,
            &request.model,
            content,
            token_usage,
        ))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.url("/models");
        let response = self
            .client
            .get(&url)
            .timeout(MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let list: ModelList = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| TaxRatesError::parse(format!("{url}: {e}")))?;
        Ok(list
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| !name.is_empty())
            .collect())
    }
}
