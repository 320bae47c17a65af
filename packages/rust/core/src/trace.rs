//! Per-key request/response trace files.
//!
//! Each key attempt gets a [`TraceId`]; every LLM request, response and the
//! final outcome for that key are appended as pretty-printed JSON entries to
//! `{dir}/{trace_id}_request.log`, `_response.log` and `_summary.log`.
//! Trace writes never fail the pipeline.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use taxrates_shared::TraceId;

/// Identifies the key attempt a trace entry belongs to.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: TraceId,
    /// Index of the worker task that handled the key.
    pub worker: usize,
    pub key: String,
}

impl TraceContext {
    pub fn new(worker: usize, key: impl Into<String>) -> Self {
        Self {
            trace_id: TraceId::new(),
            worker,
            key: key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestEntry<'a> {
    pub timestamp: String,
    pub trace_id: &'a str,
    pub worker: usize,
    pub key: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub stage: &'a str,
    pub prompt_length: usize,
    pub prompt_sha256: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseEntry<'a> {
    pub timestamp: String,
    pub trace_id: &'a str,
    pub key: &'a str,
    pub stage: &'a str,
    pub status: &'a str,
    pub content: Option<&'a str>,
    pub processing_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryEntry<'a> {
    pub timestamp: String,
    pub trace_id: &'a str,
    pub worker: usize,
    pub key: &'a str,
    pub success: bool,
    pub fallback_used: bool,
    pub outcome: &'a str,
}

/// Writes trace entries under a directory, or nowhere when disabled.
#[derive(Debug, Clone, Default)]
pub struct TraceLogger {
    dir: Option<PathBuf>,
}

impl TraceLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub async fn log_request(&self, ctx: &TraceContext, provider: &str, model: &str, stage: &str, prompt: &str) {
        let entry = RequestEntry {
            timestamp: now(),
            trace_id: ctx.trace_id.as_str(),
            worker: ctx.worker,
            key: &ctx.key,
            provider,
            model,
            stage,
            prompt_length: prompt.chars().count(),
            prompt_sha256: sha256_hex(prompt),
        };
        self.append(&ctx.trace_id, "request", &entry).await;
    }

    pub async fn log_response(
        &self,
        ctx: &TraceContext,
        stage: &str,
        outcome: std::result::Result<&str, String>,
        processing_time_ms: u64,
    ) {
        let (status, content, error) = match outcome {
            Ok(content) => ("success", Some(content), None),
            Err(error) => ("error", None, Some(error)),
        };
        let entry = ResponseEntry {
            timestamp: now(),
            trace_id: ctx.trace_id.as_str(),
            key: &ctx.key,
            stage,
            status,
            content,
            processing_time_ms,
            error,
        };
        self.append(&ctx.trace_id, "response", &entry).await;
    }

    pub async fn log_summary(&self, ctx: &TraceContext, success: bool, fallback_used: bool, outcome: &str) {
        let entry = SummaryEntry {
            timestamp: now(),
            trace_id: ctx.trace_id.as_str(),
            worker: ctx.worker,
            key: &ctx.key,
            success,
            fallback_used,
            outcome,
        };
        self.append(&ctx.trace_id, "summary", &entry).await;
    }

    async fn append<T: Serialize>(&self, trace_id: &TraceId, kind: &str, entry: &T) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("{trace_id}_{kind}.log"));
        if let Err(e) = write_entry(dir, &path, entry).await {
            warn!(path = %path.display(), error = %e, "failed to write trace entry");
        }
    }
}

async fn write_entry<T: Serialize>(dir: &Path, path: &Path, entry: &T) -> std::io::Result<()> {
    let mut body = serde_json::to_string_pretty(entry).map_err(std::io::Error::other)?;
    body.push('\n');
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(body.as_bytes()).await?;
    file.flush().await
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn read_entries(path: &Path) -> Vec<serde_json::Value> {
        let text = std::fs::read_to_string(path).unwrap();
        serde_json::Deserializer::from_str(&text)
            .into_iter::<serde_json::Value>()
            .map(|v| v.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_three_files_per_trace() {
        let dir = std::env::temp_dir().join(format!("taxrates-trace-{}", Uuid::now_v7()));
        let logger = TraceLogger::new(&dir);
        let ctx = TraceContext::new(2, "ukraine");
        let id = ctx.trace_id.clone();

        logger.log_request(&ctx, "ollama", "gemma3:12b", "chunk 1/2", "prompt one").await;
        logger.log_request(&ctx, "ollama", "gemma3:12b", "chunk 2/2", "prompt two").await;
        logger.log_response(&ctx, "chunk 1/2", Ok("summary"), 12).await;
        logger.log_response(&ctx, "chunk 2/2", Err("HTTP 500".into()), 40).await;
        logger.log_summary(&ctx, true, false, "extracted").await;

        let requests = read_entries(&dir.join(format!("{id}_request.log")));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["key"], "ukraine");
        assert_eq!(requests[0]["worker"], 2);
        assert_eq!(requests[0]["prompt_length"], 10);
        assert_eq!(requests[0]["prompt_sha256"].as_str().unwrap().len(), 64);
        assert_eq!(requests[1]["stage"], "chunk 2/2");

        let responses = read_entries(&dir.join(format!("{id}_response.log")));
        assert_eq!(responses[0]["status"], "success");
        assert_eq!(responses[1]["status"], "error");
        assert_eq!(responses[1]["error"], "HTTP 500");
        assert!(responses[1]["content"].is_null());

        let summary = read_entries(&dir.join(format!("{id}_summary.log")));
        assert_eq!(summary[0]["success"], true);
        assert_eq!(summary[0]["outcome"], "extracted");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn disabled_logger_writes_nothing() {
        let logger = TraceLogger::disabled();
        assert!(logger.dir().is_none());
        logger
            .log_summary(&TraceContext::new(0, "ukraine"), false, true, "fell back")
            .await;
    }

    #[test]
    fn digest_is_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
