//! Anthropic messages-API binding.

use super::{classify_status, transport_error, ProviderGateway, RawOutput, PROVIDER_TIMEOUT};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::review::types::Prompt;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicGateway {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AnthropicGateway {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        Self {
            api_key,
            model,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl ProviderGateway for AnthropicGateway {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<RawOutput, ProviderError> {
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "temperature": prompt.temperature,
            "system": prompt.system,
            "messages": [
                { "role": "user", "content": prompt.user },
            ]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&payload)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        if !resp.status().is_success() {
            return Err(classify_status(self.name(), resp.status()));
        }

        let body: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        body.content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| {
                ProviderError::new(
                    self.name(),
                    ProviderErrorKind::Unknown,
                    "response contained no content blocks",
                )
            })
    }
}
