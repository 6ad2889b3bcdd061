//! Google Gemini generateContent binding.

use super::{classify_status, transport_error, ProviderGateway, RawOutput, PROVIDER_TIMEOUT};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::review::types::Prompt;
use async_trait::async_trait;

pub struct GeminiGateway {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiGateway {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| {
            format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            )
        });
        Self {
            api_key,
            model,
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProviderGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<RawOutput, ProviderError> {
        // Gemini has no dedicated system role on this endpoint; fold the
        // system text into systemInstruction.
        let payload = serde_json::json!({
            "systemInstruction": {
                "parts": [{ "text": prompt.system }]
            },
            "contents": [{
                "parts": [{ "text": prompt.user }]
            }],
            "generationConfig": {
                "temperature": prompt.temperature,
                "maxOutputTokens": prompt.max_tokens,
            }
        });

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        if !resp.status().is_success() {
            return Err(classify_status(self.name(), resp.status()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new(
                    self.name(),
                    ProviderErrorKind::Unknown,
                    "response contained no candidate text",
                )
            })
    }
}
