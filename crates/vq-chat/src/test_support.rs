//! In-crate fakes for the provider traits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::DateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::GenerationConfig;
use crate::enrich::{
    ImageHit, SearchBackend, SearchHit, TimeBackend, WeatherBackend, WeatherLookup, WeatherReport, ZoneTime,
};
use crate::llm::{ChatMessage, CompletionProvider, ProviderInfo};

pub const DEFAULT_REPLY: &str = "Scripted answer.";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub config: GenerationConfig,
}

impl RecordedCall {
    pub fn system_prompt(&self) -> &str {
        self.messages.first().map(|m| m.content.as_str()).unwrap_or("")
    }
}

enum Script {
    Reply(String),
    Fail,
}

/// Completion provider that answers from a list of substring rules matched
/// against the last message, and records every call.
pub struct ScriptedProvider {
    rules: Vec<(String, Script)>,
    fail_all: bool,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self { rules: Vec::new(), fail_all: false, calls: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail_all: true, ..Self::new() }
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Script::Reply(reply.to_string())));
        self
    }

    pub fn fail_when(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Script::Fail));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The call whose first message is a system turn, i.e. the main completion.
    pub fn completion_call(&self) -> Option<RecordedCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.messages.first().map(|m| m.role == crate::llm::ChatRole::System).unwrap_or(false))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall { messages: messages.to_vec(), config: config.clone() });
        if self.fail_all {
            return Err(anyhow!("API error (500): scripted failure"));
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        match self.rules.iter().find(|(needle, _)| last.contains(needle.as_str())) {
            Some((_, Script::Reply(reply))) => Ok(reply.clone()),
            Some((_, Script::Fail)) => Err(anyhow!("API error (500): scripted failure")),
            None => Ok(DEFAULT_REPLY.to_string()),
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo { name: "Scripted".into(), model: "scripted-1".into() }
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

pub fn sample_weather(place: &str, country: &str) -> WeatherReport {
    WeatherReport {
        place: place.to_string(),
        country: Some(country.to_string()),
        condition: "Clouds".into(),
        description: "broken clouds".into(),
        temperature_c: 18.4,
        feels_like_c: 17.9,
        temp_min_c: 16.0,
        temp_max_c: 20.1,
        humidity_pct: 72,
        wind_speed_ms: 4.2,
    }
}

/// Answers from a fixed table keyed by lowercase location; unknown ⇒ not found.
pub struct FakeWeather {
    reports: HashMap<String, WeatherReport>,
    fail: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakeWeather {
    pub fn new() -> Self {
        Self { reports: HashMap::new(), fail: false, lookups: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    pub fn with_report(mut self, location: &str, report: WeatherReport) -> Self {
        self.reports.insert(location.to_lowercase(), report);
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherBackend for FakeWeather {
    async fn current(&self, location: &str) -> Result<WeatherLookup> {
        self.lookups.lock().unwrap().push(location.to_string());
        if self.fail {
            return Err(anyhow!("OpenWeatherMap request timed out"));
        }
        Ok(match self.reports.get(&location.to_lowercase()) {
            Some(report) => WeatherLookup::Found(report.clone()),
            None => WeatherLookup::NotFound,
        })
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Reports 2024-05-01 12:00 UTC+09:00 for every zone.
pub struct FakeTime {
    zones: Vec<String>,
    fail: bool,
    directory_calls: AtomicUsize,
    time_calls: AtomicUsize,
}

impl FakeTime {
    pub fn new(zones: Vec<String>) -> Self {
        Self { zones, fail: false, directory_calls: AtomicUsize::new(0), time_calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new(Vec::new()) }
    }

    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    pub fn time_calls(&self) -> usize {
        self.time_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeBackend for FakeTime {
    async fn zones(&self) -> Result<Vec<String>> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("WorldTimeAPI request timed out"));
        }
        Ok(self.zones.clone())
    }

    async fn zone_time(&self, zone: &str) -> Result<ZoneTime> {
        self.time_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("WorldTimeAPI request timed out"));
        }
        Ok(ZoneTime {
            zone: zone.to_string(),
            datetime: DateTime::parse_from_rfc3339("2024-05-01T12:00:00+09:00")?,
            abbreviation: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

pub fn hit(title: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        snippet: format!("About {}.", title),
        source: None,
        age: None,
    }
}

pub fn image(title: &str, url: &str) -> ImageHit {
    ImageHit { title: title.to_string(), url: url.to_string(), page_url: None }
}

/// Returns the same canned results for every query and records `(kind, query)`.
pub struct FakeSearch {
    web: Vec<SearchHit>,
    news: Vec<SearchHit>,
    images: Vec<ImageHit>,
    fail: bool,
    queries: Mutex<Vec<(String, String)>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self { web: Vec::new(), news: Vec::new(), images: Vec::new(), fail: false, queries: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    pub fn with_web(mut self, hits: Vec<SearchHit>) -> Self {
        self.web = hits;
        self
    }

    pub fn with_news(mut self, hits: Vec<SearchHit>) -> Self {
        self.news = hits;
        self
    }

    pub fn with_images(mut self, hits: Vec<ImageHit>) -> Self {
        self.images = hits;
        self
    }

    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, query: &str) -> Result<()> {
        self.queries.lock().unwrap().push((kind.to_string(), query.to_string()));
        if self.fail {
            return Err(anyhow!("Brave Search returned HTTP 503"));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn web(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        self.record("web", query)?;
        Ok(self.web.iter().take(count).cloned().collect())
    }

    async fn news(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        self.record("news", query)?;
        Ok(self.news.iter().take(count).cloned().collect())
    }

    async fn images(&self, query: &str, count: usize) -> Result<Vec<ImageHit>> {
        self.record("images", query)?;
        Ok(self.images.iter().take(count).cloned().collect())
    }
}
