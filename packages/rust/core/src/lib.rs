//! Core pipeline orchestration for the tax-rate updater.
//!
//! This crate ties together narrative sourcing, chunked LLM extraction with
//! retries, schema validation and dataset patching into the end-to-end
//! `update` workflow ([`run_update`]) and the hand-prepared `apply` workflow
//! ([`apply_updates`]).

pub mod extractor;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod trace;

pub use extractor::{ChunkedExtractor, Extraction};
pub use pipeline::{
    ApplySummary, KeyOutcome, ProgressReporter, RunSummary, SilentProgress, WriteMode,
    apply_updates, run_update,
};
pub use retry::RetryingInvoker;
pub use trace::{TraceContext, TraceLogger};
