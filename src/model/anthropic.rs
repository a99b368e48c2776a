//! Anthropic messages-API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{CompletionRequest, ModelClient, ModelResponse};

/// Default endpoint for the messages API.
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Client that talks to the Anthropic messages API.
pub struct AnthropicClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl AnthropicClient {
    /// Create a new client with the default endpoint.
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT.to_string())
    }

    /// Create a client with an explicit endpoint (useful for tests).
    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            api_key,
            endpoint,
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<ModelResponse> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("model API returned {status}: {text}");
        }

        let response: ModelResponse = resp.json().await?;
        Ok(response)
    }
}
