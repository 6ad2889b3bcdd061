//! Deterministic gateway double for tests and the offline CLI path.

use super::{ProviderGateway, RawOutput};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::review::types::Prompt;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Returns a canned output (or a canned failure), optionally after a
/// fixed latency, and counts how many times it was invoked.
pub struct MockGateway {
    model: String,
    response: Result<String, ProviderError>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MockGateway {
    pub fn ok(model: &str, output: &str) -> Self {
        Self {
            model: model.to_string(),
            response: Ok(output.to_string()),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(model: &str, kind: ProviderErrorKind) -> Self {
        Self {
            model: model.to_string(),
            response: Err(ProviderError::new("mock", kind, "injected failure")),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every invocation by `latency` before responding.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of completed `invoke` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, _prompt: &Prompt) -> Result<RawOutput, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Prompt;

    fn prompt() -> Prompt {
        Prompt {
            system: "system".into(),
            user: "user".into(),
            temperature: 0.3,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn canned_output_and_call_count() {
        let gateway = MockGateway::ok("mock-model", "canned review");
        assert_eq!(gateway.calls(), 0);
        let out = gateway.invoke(&prompt()).await.unwrap();
        assert_eq!(out, "canned review");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn injected_failure() {
        let gateway = MockGateway::failing("mock-model", ProviderErrorKind::Timeout);
        let err = gateway.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }
}
