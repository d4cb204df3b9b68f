//! OpenAI-compatible chat completion client (Groq by default)

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ApiProvider, ChatMessage, CompletionProvider, ProviderInfo};
use crate::config::GenerationConfig;

/// External API provider
pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: Option<String>,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ExternalProvider {
    pub fn new(provider: ApiProvider, api_key: Option<String>, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            provider = provider.name(),
            model = %model,
            "Creating ExternalProvider (connect_timeout=10s)"
        );

        Ok(Self {
            provider,
            api_key,
            model,
            client,
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML
    /// (e.g. a gateway error page) instead of valid JSON.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;
        parse_json_body(&body, status.as_u16(), endpoint)
    }
}

pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(body: &str, status: u16, endpoint: &str) -> Result<T> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(anyhow!(
            "Endpoint {} returned HTML instead of JSON (HTTP {}); the service may be down. Response: {}",
            endpoint,
            status,
            preview
        ));
    }

    serde_json::from_str::<T>(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        anyhow!(
            "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
            endpoint,
            status,
            e,
            preview
        )
    })
}

fn first_content(response: CompletionResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Provider returned empty choices array"))?
        .message
        .content
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(anyhow!("Provider returned empty content"));
    }
    Ok(content)
}

#[async_trait]
impl CompletionProvider for ExternalProvider {
    async fn complete(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String> {
        let endpoint = self.provider.endpoint();
        // The configured model wins unless the caller overrides it.
        let model = if config.model.is_empty() { self.model.as_str() } else { config.model.as_str() };
        let request = CompletionRequest {
            model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stream: false,
        };

        tracing::debug!(
            endpoint = %endpoint,
            model = %model,
            messages = messages.len(),
            max_tokens = config.max_tokens,
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&endpoint)
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(endpoint = %endpoint, "Request timed out");
                anyhow!("Request to {} timed out after {}s", endpoint, config.timeout_secs)
            } else if e.is_connect() {
                tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
                anyhow!("Failed to connect to {}: {}", endpoint, e)
            } else {
                tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
                anyhow!("Request to {} failed: {}", endpoint, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            let preview: String = error.chars().take(300).collect();
            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication failed ({}), check the API key", status),
                429 => anyhow!("Rate limit exceeded ({}): {}", status, preview),
                _ => anyhow!("API error ({}): {}", status, preview),
            });
        }

        let result: CompletionResponse = Self::parse_json_response(response, &endpoint).await?;
        first_content(result)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.provider.name().to_string(),
            model: self.model.clone(),
        }
    }
}
