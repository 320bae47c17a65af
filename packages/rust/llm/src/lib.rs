//! LLM backends behind one async interface.
//!
//! [`LlmProvider`] is the seam the pipeline talks to. Two HTTP backends
//! implement it ([`OllamaProvider`] for the local chat endpoint,
//! [`OpenAiProvider`] for the hosted API) and [`ProviderRegistry`] picks one
//! per run.

mod ollama;
mod openai;
mod provider;
mod registry;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use registry::{AUTO, ProviderRegistry};
