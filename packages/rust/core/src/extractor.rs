//! Narrative -> candidate record extraction through an LLM provider.
//!
//! Narratives up to `chunk_size` characters go out in a single request.
//! Longer ones are cut into fixed-size slices; each slice is summarized on
//! its own, and the summaries are combined by a final aggregation request.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use taxrates_dataset::scan::block_end;
use taxrates_llm::{LlmProvider, LlmRequest};
use taxrates_shared::{CountryRecord, PipelineConfig, Result, TaxRatesError};

use crate::prompts;
use crate::retry::RetryingInvoker;
use crate::trace::{TraceContext, TraceLogger};

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A parsed JSON object, not yet schema-checked.
    Record(Value),
    /// No candidate could be produced.
    Failed(String),
}

/// Cut `text` into consecutive slices of at most `size` characters.
pub fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// The first balanced `{...}` region of a model reply.
///
/// Prose before the object is skipped; the closing brace is found with a
/// string-aware scan so braces inside JSON strings do not count.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = block_end(text, start)?;
    Some(&text[start..end])
}

fn parse_candidate(reply: &str) -> Extraction {
    let Some(object) = first_json_object(reply) else {
        return Extraction::Failed("no JSON object in model response".into());
    };
    match serde_json::from_str::<Value>(object) {
        Ok(value) => Extraction::Record(value),
        Err(e) => Extraction::Failed(format!("model response is not valid JSON: {e}")),
    }
}

fn is_no_info(summary: &str) -> bool {
    let trimmed = summary.trim();
    trimmed.is_empty() || trimmed.trim_end_matches('.') == prompts::NO_TAX_INFO.trim_end_matches('.')
}

/// Drives provider calls for one narrative at a time.
pub struct ChunkedExtractor {
    provider: Arc<dyn LlmProvider>,
    invoker: RetryingInvoker,
    model: String,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    chunk_size: usize,
    trace: TraceLogger,
}

impl ChunkedExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &PipelineConfig, trace: TraceLogger) -> Self {
        Self {
            provider,
            invoker: RetryingInvoker::new(config.retry),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: config.stream,
            chunk_size: config.chunk_size.max(1),
            trace,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Extract a candidate record for `ctx.key` from `narrative`.
    pub async fn extract(&self, ctx: &TraceContext, prior: Option<&CountryRecord>, narrative: &str) -> Extraction {
        let chars = narrative.chars().count();
        if chars <= self.chunk_size {
            debug!(key = %ctx.key, chars, "single-shot extraction");
            let prompt = prompts::single_shot(&ctx.key, prior, narrative);
            return match self.call(ctx, "single_shot", prompt).await {
                Ok(reply) => parse_candidate(&reply),
                Err(e) => Extraction::Failed(e.to_string()),
            };
        }

        let chunks = split_chunks(narrative, self.chunk_size);
        let total = chunks.len();
        info!(key = %ctx.key, chars, chunks = total, "chunked extraction");

        let mut summaries = Vec::new();
        let mut answered = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let index = i + 1;
            let stage = format!("chunk {index}/{total}");
            let prompt = prompts::chunk_summary(&ctx.key, prior, index, total, chunk);
            match self.call(ctx, &stage, prompt).await {
                Ok(summary) => {
                    answered += 1;
                    if is_no_info(&summary) {
                        debug!(key = %ctx.key, index, "chunk has no taxation information");
                    } else {
                        summaries.push(format!("Summary {index}:\n{}", summary.trim()));
                    }
                }
                Err(e) => warn!(key = %ctx.key, index, error = %e, "chunk failed; omitting"),
            }
        }

        if answered == 0 {
            return Extraction::Failed(format!("all {total} chunks failed"));
        }

        let prompt = prompts::aggregate(&ctx.key, prior, &summaries.join("\n\n"));
        match self.call(ctx, "aggregate", prompt).await {
            Ok(reply) => parse_candidate(&reply),
            Err(e) => Extraction::Failed(e.to_string()),
        }
    }

    /// One retried provider call. Each attempt is traced.
    async fn call(&self, ctx: &TraceContext, stage: &str, prompt: String) -> Result<String> {
        let mut request = LlmRequest::new(prompt, self.model.as_str())
            .with_system_prompt(prompts::SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_stream(self.stream);
        if self.max_tokens > 0 {
            request = request.with_max_tokens(self.max_tokens);
        }
        let request = &request;
        let label = format!("{} {stage}", ctx.key);

        self.invoker
            .invoke(&label, move |_| async move {
                self.trace
                    .log_request(ctx, self.provider.name(), &request.model, stage, &request.prompt)
                    .await;
                let started = Instant::now();
                let result = self.provider.generate(request).await.and_then(|response| {
                    if response.success {
                        Ok(response.content)
                    } else {
                        Err(TaxRatesError::Llm(
                            response.error.unwrap_or_else(|| "provider reported failure".into()),
                        ))
                    }
                });
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let outcome = match &result {
                    Ok(content) => Ok(content.as_str()),
                    Err(e) => Err(e.to_string()),
                };
                self.trace.log_response(ctx, stage, outcome, elapsed_ms).await;
                result
            })
            .await
    }
}
