//! Enrichment fetchers
//!
//! Each fetcher turns one detected intent into a text block for the system
//! prompt. Provider calls go through a backend trait so a fetcher can be
//! skipped when unconfigured and faked in tests. Fetchers never return errors:
//! a failed or empty lookup yields an explicit fallback instruction instead.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod images;
pub mod search;
pub mod time;
pub mod weather;

pub use images::ImageFetcher;
pub use search::{BraveSearch, ImageHit, SearchBackend, SearchFetcher, SearchHit};
pub use time::{TimeBackend, TimeFetcher, WorldTimeApi, ZoneTime};
pub use weather::{OpenWeatherMap, WeatherBackend, WeatherFetcher, WeatherLookup, WeatherReport};

/// Result of a single fetch: the prompt text (empty when nothing usable came
/// back) and the parameter the fetcher actually used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub text: String,
    pub resolved: String,
}

impl FetchOutcome {
    pub fn found(text: String, resolved: impl Into<String>) -> Self {
        Self { text, resolved: resolved.into() }
    }

    pub fn empty(original: impl Into<String>) -> Self {
        Self { text: String::new(), resolved: original.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    Weather,
    Time,
    Images,
    WebSearch,
}

impl EnrichmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentSource::Weather => "weather",
            EnrichmentSource::Time => "time",
            EnrichmentSource::Images => "images",
            EnrichmentSource::WebSearch => "web_search",
        }
    }
}

/// A text block destined for the system prompt, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub source: EnrichmentSource,
    pub text: String,
}

impl Enrichment {
    pub fn new(source: EnrichmentSource, text: String) -> Self {
        Self { source, text }
    }
}

/// HTTP client shared by the enrichment backends: short, per-call timeout so a
/// slow provider cannot hold up the completion call.
pub(crate) fn provider_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeout_secs.min(5)))
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("vq-chat/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
}

/// Read a provider response as JSON, surfacing transport and status failures
/// with the provider name attached.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    provider: &str,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response body from {}: {}", provider, e))?;
    if !status.is_success() {
        let preview: String = body.chars().take(200).collect();
        return Err(anyhow!("{} returned HTTP {}: {}", provider, status, preview));
    }
    crate::llm::external::parse_json_body(&body, status.as_u16(), provider)
}

/// Map a reqwest send error to a short, loggable message.
pub(crate) fn describe_send_error(provider: &str, e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        anyhow!("{} request timed out", provider)
    } else if e.is_connect() {
        anyhow!("Failed to connect to {}: {}", provider, e)
    } else {
        anyhow!("{} request failed: {}", provider, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_outcome_emptiness() {
        assert!(FetchOutcome::empty("Tokyo").is_empty());
        assert_eq!(FetchOutcome::empty("Tokyo").resolved, "Tokyo");
        assert!(!FetchOutcome::found("Temperature: 21°C".into(), "Tokyo, JP").is_empty());
        assert_eq!(EnrichmentSource::WebSearch.as_str(), "web_search");
    }
}
