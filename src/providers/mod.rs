//! Provider bindings behind one capability interface.
//!
//! Each vendor adapts its own transport and auth to [`ProviderGateway`];
//! nothing outside this module branches on vendor identity. The
//! orchestrator selects a gateway from a [`ProviderRegistry`] keyed by
//! model name, which also makes test doubles a one-line swap.

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicGateway;
pub use gemini::GeminiGateway;
pub use mock::MockGateway;
pub use openai::OpenAiGateway;

use crate::config::ProvidersConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::review::types::Prompt;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Raw provider output before normalization. Free text or JSON,
/// shape varies per vendor and per prompt style.
pub type RawOutput = String;

/// Per-call ceiling for one provider invocation.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// One LLM backend: prompt in, raw output or a classified failure out.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Vendor name ("openai", "anthropic", "gemini", "mock").
    fn name(&self) -> &str;

    /// Model this gateway is bound to.
    fn model(&self) -> &str;

    async fn invoke(&self, prompt: &Prompt) -> Result<RawOutput, ProviderError>;
}

/// Model name -> gateway mapping, fixed at construction.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    gateways: HashMap<String, Arc<dyn ProviderGateway>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured credentials. Providers without
    /// an API key are left out.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        if let Some(openai) = &config.openai {
            registry.register(Arc::new(OpenAiGateway::new(
                openai.api_key.clone(),
                openai.model.clone(),
                openai.endpoint.clone(),
            )));
        }
        if let Some(anthropic) = &config.anthropic {
            registry.register(Arc::new(AnthropicGateway::new(
                anthropic.api_key.clone(),
                anthropic.model.clone(),
                anthropic.endpoint.clone(),
            )));
        }
        if let Some(gemini) = &config.gemini {
            registry.register(Arc::new(GeminiGateway::new(
                gemini.api_key.clone(),
                gemini.model.clone(),
                gemini.endpoint.clone(),
            )));
        }
        registry
    }

    /// Register a gateway under its model name. Last write wins.
    pub fn register(&mut self, gateway: Arc<dyn ProviderGateway>) {
        self.gateways.insert(gateway.model().to_string(), gateway);
    }

    pub fn get(&self, model: &str) -> Option<Arc<dyn ProviderGateway>> {
        self.gateways.get(model).cloned()
    }

    /// All registered model names, sorted for deterministic fan-out.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.gateways.keys().cloned().collect();
        models.sort();
        models
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

// ── Shared HTTP error mapping ────────────────────────────────────

/// Classify a non-success HTTP status into the provider error taxonomy.
pub(crate) fn classify_status(
    provider: &str,
    status: reqwest::StatusCode,
) -> ProviderError {
    let kind = match status.as_u16() {
        401 | 403 => ProviderErrorKind::Auth,
        429 => ProviderErrorKind::RateLimited,
        400 | 404 | 422 => ProviderErrorKind::MalformedRequest,
        _ => ProviderErrorKind::Unknown,
    };
    ProviderError::new(provider, kind, format!("upstream returned HTTP {status}"))
}

/// Map a reqwest transport failure into the taxonomy.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, PROVIDER_TIMEOUT.as_secs())
    } else {
        ProviderError::new(
            provider,
            ProviderErrorKind::Unknown,
            format!("transport failure: {err}"),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_by_model() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockGateway::ok("gpt-4o", "fine")));
        registry.register(Arc::new(MockGateway::ok("claude-sonnet", "fine")));

        assert!(registry.get("gpt-4o").is_some());
        assert!(registry.get("unknown-model").is_none());
        assert_eq!(registry.models(), vec!["claude-sonnet", "gpt-4o"]);
    }

    #[test]
    fn status_classification() {
        let auth = classify_status("openai", reqwest::StatusCode::UNAUTHORIZED);
        assert_eq!(auth.kind, ProviderErrorKind::Auth);
        assert!(!auth.kind.retryable());

        let limited = classify_status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.kind, ProviderErrorKind::RateLimited);
        assert!(limited.kind.retryable());

        let other = classify_status("openai", reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(other.kind, ProviderErrorKind::Unknown);
    }
}
