//! Provider registration and per-run selection.

use std::sync::Arc;

use tracing::{debug, info};

use taxrates_shared::{Result, TaxRatesError};

use crate::provider::LlmProvider;

/// Provider choice that defers to model-name conventions and availability.
pub const AUTO: &str = "auto";

/// Providers in registration order.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; a later provider with the same name replaces it.
    pub fn add(&mut self, provider: Arc<dyn LlmProvider>) {
        match self.providers.iter().position(|p| p.name() == provider.name()) {
            Some(idx) => self.providers[idx] = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    /// Names of the providers that currently report themselves available.
    pub async fn available(&self) -> Vec<String> {
        let mut out = Vec::new();
        for provider in &self.providers {
            if provider.is_available().await {
                out.push(provider.name().to_string());
            }
        }
        out
    }

    /// Pick the provider for a run.
    ///
    /// An explicit `choice` must name a registered, available provider. With
    /// [`AUTO`], a provider claiming `model` wins if available, else the first
    /// available provider in registration order.
    pub async fn select(&self, choice: &str, model: &str) -> Result<Arc<dyn LlmProvider>> {
        if choice != AUTO {
            let provider = self.get(choice).ok_or_else(|| {
                TaxRatesError::config(format!(
                    "unknown LLM provider `{choice}` (registered: {})",
                    self.names().join(", ")
                ))
            })?;
            if !provider.is_available().await {
                return Err(TaxRatesError::config(format!(
                    "LLM provider `{choice}` is not available"
                )));
            }
            info!(provider = choice, "using configured provider");
            return Ok(provider);
        }

        for provider in self.providers.iter().filter(|p| p.claims_model(model)) {
            if provider.is_available().await {
                info!(provider = provider.name(), model, "provider selected by model name");
                return Ok(Arc::clone(provider));
            }
            debug!(provider = provider.name(), "claiming provider unavailable");
        }

        for provider in &self.providers {
            if provider.is_available().await {
                info!(provider = provider.name(), "first available provider selected");
                return Ok(Arc::clone(provider));
            }
        }

        Err(TaxRatesError::config("no LLM provider available"))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::provider::{LlmRequest, LlmResponse};

    struct Fake {
        name: &'static str,
        available: bool,
        prefix: Option<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for Fake {
        fn name(&self) -> &str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse::from_content(self.name, &request.model, "ok".into(), None))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn claims_model(&self, model: &str) -> bool {
            self.prefix.is_some_and(|p| model.starts_with(p))
        }
    }

    fn registry(local: bool, cloud: bool) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.add(Arc::new(Fake {
            name: "ollama",
            available: local,
            prefix: None,
        }));
        registry.add(Arc::new(Fake {
            name: "openai",
            available: cloud,
            prefix: Some("gpt-"),
        }));
        registry
    }

    #[tokio::test]
    async fn explicit_choice() {
        let picked = registry(true, true).select("openai", "gemma3:12b").await.unwrap();
        assert_eq!(picked.name(), "openai");

        let err = registry(true, false).select("openai", "gpt-4o").await.err().unwrap();
        assert!(err.to_string().contains("not available"));

        let err = registry(true, true).select("claude", "x").await.err().unwrap();
        assert!(err.to_string().contains("unknown LLM provider"));
    }

    #[tokio::test]
    async fn auto_prefers_model_claim() {
        let picked = registry(true, true).select(AUTO, "gpt-4o").await.unwrap();
        assert_eq!(picked.name(), "openai");

        let picked = registry(true, true).select(AUTO, "gemma3:12b").await.unwrap();
        assert_eq!(picked.name(), "ollama");
    }

    #[tokio::test]
    async fn auto_falls_back_to_first_available() {
        let picked = registry(true, false).select(AUTO, "gpt-4o").await.unwrap();
        assert_eq!(picked.name(), "ollama");

        let picked = registry(false, true).select(AUTO, "gemma3:12b").await.unwrap();
        assert_eq!(picked.name(), "openai");
    }

    #[tokio::test]
    async fn nothing_available_is_fatal() {
        let err = registry(false, false).select(AUTO, "gemma3:12b").await.err().unwrap();
        assert!(matches!(err, TaxRatesError::Config { .. }));
        assert_eq!(err.to_string(), "config error: no LLM provider available");
    }

    #[tokio::test]
    async fn registration_order_and_replacement() {
        let mut registry = registry(false, false);
        registry.add(Arc::new(Fake {
            name: "ollama",
            available: true,
            prefix: None,
        }));
        assert_eq!(registry.names(), vec!["ollama", "openai"]);
        assert_eq!(registry.available().await, vec!["ollama".to_string()]);
    }
}
