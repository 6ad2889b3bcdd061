//! OpenAI chat-completions binding.

use super::{classify_status, transport_error, ProviderGateway, RawOutput, PROVIDER_TIMEOUT};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::review::types::Prompt;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiGateway {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiGateway {
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
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[async_trait]
impl ProviderGateway for OpenAiGateway {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<RawOutput, ProviderError> {
        let payload = serde_json::json!({
            "model": self.model,
            "temperature": prompt.temperature,
            "max_tokens": prompt.max_tokens,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        if !resp.status().is_success() {
            return Err(classify_status(self.name(), resp.status()));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::new(
                    self.name(),
                    ProviderErrorKind::Unknown,
                    "response contained no choices",
                )
            })
    }
}
