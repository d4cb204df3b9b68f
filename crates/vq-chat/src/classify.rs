//! Secondary classification calls
//!
//! Short, near-deterministic completion calls that answer one narrow question
//! about the visitor's message in a fixed line format ("QUERY: ...", "YES").
//! Every use site goes through [`Classifier::classify`] with a task that owns
//! its prompt template and its line-prefix parser.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::llm::{ChatMessage, CompletionProvider};

/// A single classification question: how to ask it and how to read the reply.
pub trait ClassificationTask {
    type Output;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    fn prompt(&self, input: &str) -> String;

    /// Interpret the raw reply. Must always produce a value; `input` is the
    /// safe fallback when the reply is unusable.
    fn parse(&self, raw: &str, input: &str) -> Self::Output;
}

#[derive(Clone)]
pub struct Classifier {
    provider: Arc<dyn CompletionProvider>,
    config: GenerationConfig,
}

impl Classifier {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    pub async fn classify<T: ClassificationTask + Sync>(&self, task: &T, input: &str) -> Result<T::Output> {
        let messages = [ChatMessage::user(task.prompt(input))];
        let raw = self
            .provider
            .complete(&messages, &self.config)
            .await
            .with_context(|| format!("{} classification call failed", task.name()))?;

        tracing::debug!(task = task.name(), reply = %raw.trim(), "classification reply");
        Ok(task.parse(&raw, input))
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Find the first line starting with `prefix` (case-insensitive) and return the
/// rest of it, trimmed of whitespace, quotes and markdown emphasis.
pub fn line_value(raw: &str, prefix: &str) -> Option<String> {
    raw.lines()
        .map(|line| line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '*' | '•' | '`' | '#')))
        .find_map(|line| {
            let head = line.get(..prefix.len())?;
            if !head.eq_ignore_ascii_case(prefix) {
                return None;
            }
            let value = line[prefix.len()..]
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '`')
                .trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        })
}

fn is_none_marker(value: &str) -> bool {
    let v = value.trim().trim_end_matches('.').to_ascii_lowercase();
    matches!(v.as_str(), "none" | "null" | "n/a" | "unknown" | "no location" | "")
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Does answering the message need fresh information from the web?
pub struct SearchNeed;

impl ClassificationTask for SearchNeed {
    type Output = bool;

    fn name(&self) -> &'static str {
        "search_need"
    }

    fn prompt(&self, input: &str) -> String {
        format!(
            "You decide whether a chatbot needs a live web search to answer a website visitor.\n\
             Answer YES only if the message asks about current events, recent news, live facts, \
             prices, sports results, or anything that changes over time and that a language model \
             could not know reliably.\n\
             Answer NO for greetings, opinions, theology, history, methodology, the website itself, \
             weather, or the time.\n\
             Reply with exactly one word: YES or NO.\n\n\
             Message: \"{}\"",
            input
        )
    }

    fn parse(&self, raw: &str, _input: &str) -> bool {
        let first = raw
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .split(|c: char| !c.is_ascii_alphanumeric())
            .next()
            .unwrap_or("");
        first.eq_ignore_ascii_case("yes")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub query: String,
    pub news: bool,
}

/// Condense the message into a search query and decide news vs. general.
pub struct SearchQuery;

impl ClassificationTask for SearchQuery {
    type Output = SearchPlan;

    fn name(&self) -> &'static str {
        "search_query"
    }

    fn prompt(&self, input: &str) -> String {
        format!(
            "Turn the website visitor's message into a concise web search query (max 8 words) \
             and decide whether it is about recent news.\n\
             Reply with exactly two lines and nothing else:\n\
             QUERY: <search query>\n\
             NEWS: <YES or NO>\n\n\
             Message: \"{}\"",
            input
        )
    }

    fn parse(&self, raw: &str, input: &str) -> SearchPlan {
        let query = line_value(raw, "QUERY:").unwrap_or_else(|| input.trim().to_string());
        let news = line_value(raw, "NEWS:")
            .map(|v| v.to_ascii_lowercase().starts_with("yes"))
            .unwrap_or(false);
        SearchPlan { query, news }
    }
}

/// Extract the subject the visitor wants to see a picture of.
pub struct ImageQuery;

impl ClassificationTask for ImageQuery {
    type Output = String;

    fn name(&self) -> &'static str {
        "image_query"
    }

    fn prompt(&self, input: &str) -> String {
        format!(
            "The website visitor wants to see an image. Extract the subject as a short image \
             search query (max 5 words), without words like \"show me\" or \"picture of\".\n\
             Reply with exactly one line:\n\
             QUERY: <image search query>\n\n\
             Message: \"{}\"",
            input
        )
    }

    fn parse(&self, raw: &str, input: &str) -> String {
        line_value(raw, "QUERY:").unwrap_or_else(|| input.trim().to_string())
    }
}

/// Pull a place name out of free text, if there is one.
pub struct LocationExtraction;

impl ClassificationTask for LocationExtraction {
    type Output = Option<String>;

    fn name(&self) -> &'static str {
        "location"
    }

    fn prompt(&self, input: &str) -> String {
        format!(
            "Extract the city, town or place the message refers to. Include the country or \
             state if the message gives it. If the message names no place at all, answer NONE.\n\
             Reply with exactly one line:\n\
             LOCATION: <place or NONE>\n\n\
             Message: \"{}\"",
            input
        )
    }

    fn parse(&self, raw: &str, _input: &str) -> Option<String> {
        line_value(raw, "LOCATION:").filter(|v| !is_none_marker(v))
    }
}

/// Map a place the weather provider does not know to the nearest major city.
pub struct NearestCity;

impl ClassificationTask for NearestCity {
    type Output = Option<String>;

    fn name(&self) -> &'static str {
        "nearest_city"
    }

    fn prompt(&self, input: &str) -> String {
        format!(
            "A weather service could not find the place \"{}\". Name the nearest major city \
             that a weather service will recognise, written as \"City, Country\". \
             If you cannot tell, answer NONE.\n\
             Reply with exactly one line:\n\
             CITY: <city or NONE>",
            input
        )
    }

    fn parse(&self, raw: &str, _input: &str) -> Option<String> {
        line_value(raw, "CITY:").filter(|v| !is_none_marker(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    #[test]
    fn test_line_value_prefix_matching() {
        let raw = "```\nquery: \"golden retriever puppy\"\nNEWS: no\n```";
        assert_eq!(line_value(raw, "QUERY:").as_deref(), Some("golden retriever puppy"));
        assert_eq!(line_value(raw, "NEWS:").as_deref(), Some("no"));
        assert_eq!(line_value(raw, "LOCATION:"), None);
        assert_eq!(line_value("- **QUERY:** mars rover", "QUERY:").as_deref(), Some("mars rover"));
        assert_eq!(line_value("QUERY:", "QUERY:"), None);
    }

    #[test]
    fn test_search_need_parsing() {
        assert!(SearchNeed.parse("YES", "x"));
        assert!(SearchNeed.parse("yes.", "x"));
        assert!(!SearchNeed.parse("NO", "x"));
        assert!(!SearchNeed.parse("Maybe, it depends", "x"));
        assert!(!SearchNeed.parse("", "x"));
    }

    #[test]
    fn test_search_query_falls_back_to_message() {
        let plan = SearchQuery.parse("QUERY: SpaceX launch today\nNEWS: YES", "did spacex launch?");
        assert_eq!(plan, SearchPlan { query: "SpaceX launch today".into(), news: true });

        let plan = SearchQuery.parse("I think you should search for it", "did spacex launch?");
        assert_eq!(plan, SearchPlan { query: "did spacex launch?".into(), news: false });

        let plan = SearchQuery.parse("QUERY: bitcoin price", "btc?");
        assert!(!plan.news);
    }

    #[test]
    fn test_location_none_marker() {
        assert_eq!(LocationExtraction.parse("LOCATION: NONE", "weather"), None);
        assert_eq!(LocationExtraction.parse("LOCATION: n/a", "weather"), None);
        assert_eq!(
            LocationExtraction.parse("LOCATION: Tokyo, Japan", "weather in tokyo"),
            Some("Tokyo, Japan".to_string())
        );
        assert_eq!(NearestCity.parse("CITY: Denver, USA", "Aspen Highlands"), Some("Denver, USA".into()));
        assert_eq!(NearestCity.parse("no idea", "Aspen Highlands"), None);
    }

    #[tokio::test]
    async fn test_classifier_uses_classification_settings() {
        let provider = Arc::new(ScriptedProvider::new().reply_when("Extract the subject", "QUERY: golden retriever"));
        let classifier = Classifier::new(provider.clone(), GenerationConfig::classification());

        let query = classifier.classify(&ImageQuery, "show me a golden retriever").await.unwrap();
        assert_eq!(query, "golden retriever");

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].config.temperature, 0.1);
        assert!(calls[0].messages[0].content.contains("show me a golden retriever"));
    }

    #[tokio::test]
    async fn test_classifier_surfaces_provider_errors() {
        let provider = Arc::new(ScriptedProvider::failing());
        let classifier = Classifier::new(provider, GenerationConfig::classification());
        let err = classifier.classify(&SearchNeed, "news today").await.unwrap_err();
        assert!(err.to_string().contains("search_need"));
    }
}
