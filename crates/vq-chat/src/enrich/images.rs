//! Image search enrichment: embeddable `<img>` tags for a handful of results
//! from hosts that allow hotlinking.

use std::sync::Arc;
use url::Url;

use super::search::{ImageHit, SearchBackend};
use super::FetchOutcome;
use crate::classify::{Classifier, ImageQuery};

/// Hosts that block hotlinking, require login, or serve short-lived URLs.
pub const BLOCKED_IMAGE_DOMAINS: &[&str] = &[
    "instagram.com",
    "cdninstagram.com",
    "facebook.com",
    "fbcdn.net",
    "fbsbx.com",
    "tiktok.com",
    "tiktokcdn.com",
    "x.com",
    "twitter.com",
    "twimg.com",
    "pinimg.com",
    "pinterest.com",
    "gstatic.com",
    "googleusercontent.com",
    "shutterstock.com",
    "gettyimages.com",
    "istockphoto.com",
    "alamy.com",
    "dreamstime.com",
    "123rf.com",
    "adobe.com",
    "depositphotos.com",
];

/// Candidates requested from the provider before filtering.
const CANDIDATES: usize = 10;

/// Most images a single reply may embed.
pub const MAX_IMAGES: usize = 2;

/// True when the URL is unusable or its host is, or is under, a blocked domain.
pub fn is_blocked(image_url: &str) -> bool {
    let Ok(parsed) = Url::parse(image_url) else {
        return true;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return true;
    }
    let Some(host) = parsed.host_str() else {
        return true;
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_IMAGE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

pub fn no_images_instruction(query: &str) -> String {
    format!(
        "# IMAGE SEARCH: NO IMAGES AVAILABLE\n\
         No displayable images were found for \"{}\". Tell the visitor briefly that you could not \
         find a picture. Do not output any image tags, image links or markdown images, and do not \
         invent image URLs.",
        query
    )
}

pub struct ImageFetcher {
    backend: Arc<dyn SearchBackend>,
    max_images: usize,
}

impl ImageFetcher {
    pub fn new(backend: Arc<dyn SearchBackend>, max_images: usize) -> Self {
        Self { backend, max_images: max_images.min(MAX_IMAGES) }
    }

    /// `None` when the query extraction call itself failed: no search runs
    /// and nothing is injected.
    pub async fn fetch(&self, message: &str, classifier: &Classifier) -> Option<FetchOutcome> {
        let query = match classifier.classify(&ImageQuery, message).await {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(error = %e, "Image query extraction failed, skipping image search");
                return None;
            }
        };

        let hits = match self.backend.images(&query, CANDIDATES).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Image search failed");
                return Some(FetchOutcome::empty(query));
            }
        };

        let total = hits.len();
        let usable = filter_images(hits, self.max_images);
        tracing::info!(query = %query, candidates = total, kept = usable.len(), "Image search finished");
        if usable.is_empty() {
            return Some(FetchOutcome::empty(query));
        }
        Some(FetchOutcome::found(format_images(&query, &usable), query))
    }
}

fn filter_images(hits: Vec<ImageHit>, max_images: usize) -> Vec<ImageHit> {
    hits.into_iter()
        .filter(|hit| !is_blocked(&hit.url))
        .take(max_images)
        .collect()
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_images(query: &str, images: &[ImageHit]) -> String {
    let mut text = format!("# IMAGES for \"{}\" (live image search)\n", query);
    text.push_str(
        "Include each tag below exactly as written, on its own line, with a short description. \
         Do not wrap them in code blocks and do not add other images.\n",
    );
    for image in images {
        let title = if image.title.is_empty() { query } else { image.title.as_str() };
        text.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\" title=\"{}\" style=\"max-width:100%;border-radius:8px;\">\n",
            escape_attr(&image.url),
            escape_attr(title),
            escape_attr(title)
        ));
    }
    text.trim_end().to_string()
}
