//! Web, news and image search via the Brave Search API, plus the web-search
//! enrichment that turns results into prompt text.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use super::{describe_send_error, provider_client, read_json, FetchOutcome};
use crate::classify::{Classifier, SearchPlan, SearchQuery};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1";

/// Second general query, phrased to pull in explanatory pages.
const DETAIL_SUFFIX: &str = " details explained";

/// Results requested per underlying provider call.
const PER_QUERY_COUNT: usize = 5;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag regex is valid"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: Option<String>,
    pub age: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    pub title: String,
    /// Direct image URL.
    pub url: String,
    /// Page the image was found on.
    pub page_url: Option<String>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn web(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;

    async fn news(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;

    async fn images(&self, query: &str, count: usize) -> Result<Vec<ImageHit>>;
}

// ============================================================================
// Brave Search
// ============================================================================

pub struct BraveSearch {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BraveWebResponse {
    #[serde(default)]
    web: Option<BraveResults>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    meta_url: Option<BraveMetaUrl>,
}

#[derive(Debug, Deserialize)]
struct BraveMetaUrl {
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveImageResults {
    #[serde(default)]
    results: Vec<BraveImage>,
}

#[derive(Debug, Deserialize)]
struct BraveImage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    properties: Option<BraveImageProperties>,
}

#[derive(Debug, Deserialize)]
struct BraveImageProperties {
    #[serde(default)]
    url: Option<String>,
}

impl From<BraveResult> for SearchHit {
    fn from(r: BraveResult) -> Self {
        Self {
            title: clean_text(&r.title),
            url: r.url,
            snippet: clean_text(&r.description),
            source: r.meta_url.and_then(|m| m.hostname).filter(|h| !h.is_empty()),
            age: r.age.filter(|a| !a.is_empty()),
        }
    }
}

fn web_hits(body: BraveWebResponse) -> Vec<SearchHit> {
    body.web
        .unwrap_or_default()
        .results
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .map(SearchHit::from)
        .collect()
}

fn news_hits(body: BraveResults) -> Vec<SearchHit> {
    body.results
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .map(SearchHit::from)
        .collect()
}

fn image_hits(body: BraveImageResults) -> Vec<ImageHit> {
    body.results
        .into_iter()
        .filter_map(|img| {
            let url = img.properties.and_then(|p| p.url).filter(|u| !u.is_empty())?;
            Some(ImageHit {
                title: clean_text(&img.title),
                url,
                page_url: img.url,
            })
        })
        .collect()
}

/// Provider snippets carry `<strong>` highlighting and entities.
fn clean_text(text: &str) -> String {
    HTML_TAG_RE
        .replace_all(text, "")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

impl BraveSearch {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: BRAVE_API_URL.to_string(),
            client: provider_client(timeout_secs)?,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, kind: &str, query: &str, count: usize) -> Result<T> {
        let count = count.to_string();
        let response = self
            .client
            .get(format!("{}/{}/search", self.base_url, kind))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str()), ("safesearch", "strict")])
            .send()
            .await
            .map_err(|e| describe_send_error("Brave Search", e))?;
        read_json(response, "Brave Search").await
    }
}

#[async_trait]
impl SearchBackend for BraveSearch {
    async fn web(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        Ok(web_hits(self.get("web", query, count).await?))
    }

    async fn news(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        Ok(news_hits(self.get("news", query, count).await?))
    }

    async fn images(&self, query: &str, count: usize) -> Result<Vec<ImageHit>> {
        Ok(image_hits(self.get("images", query, count).await?))
    }
}

// ============================================================================
// Web-search enrichment
// ============================================================================

pub fn no_results_instruction(query: &str) -> String {
    format!(
        "# WEB SEARCH: NO USABLE RESULTS\n\
         A live search for \"{}\" returned no usable results. Tell the visitor you could not find \
         current information on this. Do not fabricate facts, figures, dates, names or links.",
        query
    )
}

pub struct SearchFetcher {
    backend: Arc<dyn SearchBackend>,
    max_results: usize,
}

impl SearchFetcher {
    pub fn new(backend: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self { backend, max_results }
    }

    /// Plan the query with the classifier, run it, and format what came back.
    /// Empty outcome when nothing usable was found; `None` when the planning
    /// call failed and no search ran.
    pub async fn fetch(&self, message: &str, classifier: &Classifier) -> Option<FetchOutcome> {
        let plan = match classifier.classify(&SearchQuery, message).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "Search query planning failed, skipping web search");
                return None;
            }
        };

        let hits = if plan.news {
            self.news(&plan.query).await
        } else {
            self.general(&plan.query).await
        };

        tracing::info!(query = %plan.query, news = plan.news, results = hits.len(), "Web search finished");
        if hits.is_empty() {
            return Some(FetchOutcome::empty(plan.query));
        }
        Some(FetchOutcome::found(format_hits(&plan, &hits), plan.query))
    }

    async fn news(&self, query: &str) -> Vec<SearchHit> {
        match self.backend.news(query, self.max_results).await {
            Ok(hits) => hits.into_iter().take(self.max_results).collect(),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "News search failed");
                Vec::new()
            }
        }
    }

    /// Base query plus a detail-oriented variant, merged and deduplicated by URL.
    async fn general(&self, query: &str) -> Vec<SearchHit> {
        let detailed = format!("{}{}", query, DETAIL_SUFFIX);
        let mut merged = Vec::new();
        for q in [query, detailed.as_str()] {
            match self.backend.web(q, PER_QUERY_COUNT).await {
                Ok(hits) => merged.extend(hits),
                Err(e) => tracing::warn!(query = %q, error = %e, "Web search failed"),
            }
        }
        dedupe_by_url(merged, self.max_results)
    }
}

fn url_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

fn dedupe_by_url(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(url_key(&hit.url)))
        .take(limit)
        .collect()
}

fn format_hits(plan: &SearchPlan, hits: &[SearchHit]) -> String {
    let kind = if plan.news { "NEWS" } else { "WEB" };
    let mut text = format!(
        "# LIVE {} SEARCH RESULTS for \"{}\" (retrieved just now)\n",
        kind, plan.query
    );
    for (i, hit) in hits.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, hit.title));
        match (&hit.source, &hit.age) {
            (Some(source), Some(age)) => text.push_str(&format!("   Source: {} ({})\n", source, age)),
            (Some(source), None) => text.push_str(&format!("   Source: {}\n", source)),
            (None, Some(age)) => text.push_str(&format!("   Published: {}\n", age)),
            (None, None) => {}
        }
        if !hit.snippet.is_empty() {
            text.push_str(&format!("   {}\n", hit.snippet));
        }
        text.push_str(&format!("   Link: {}\n", hit.url));
    }
    text.push_str(
        "Answer using only these results. Cite sources by name and include links where helpful. \
         If they do not answer the question, say so.",
    );
    text
}
