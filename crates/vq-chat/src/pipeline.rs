//! Chat request pipeline
//!
//! guard → intents → context → enrichments → completion → post-processing.
//! Every external dependency is injected so the whole flow runs against fakes.

use std::sync::Arc;

use crate::classify::{Classifier, LocationExtraction, SearchNeed};
use crate::config::ChatConfig;
use crate::context::ContextLibrary;
use crate::enrich::{
    images, search, time, weather, Enrichment, EnrichmentSource, ImageFetcher, SearchBackend, SearchFetcher,
    TimeBackend, TimeFetcher, WeatherBackend, WeatherFetcher,
};
use crate::error::ChatError;
use crate::guard::detect_red_flag;
use crate::intent::{IntentDetector, IntentFlags};
use crate::llm::{CompletionProvider, ProviderInfo};
use crate::prompt::{
    build_messages, compose_system_prompt, page_context_block, previous_assistant_turn, sanitize_history,
    strip_code_fences,
};
use crate::types::{Capabilities, ChatReply, ChatRequest};

pub struct ChatPipeline {
    config: ChatConfig,
    context: ContextLibrary,
    detector: IntentDetector,
    provider: Option<Arc<dyn CompletionProvider>>,
    classifier: Option<Classifier>,
    weather: Option<WeatherFetcher>,
    time: Option<TimeFetcher>,
    images: Option<ImageFetcher>,
    search: Option<SearchFetcher>,
}

impl ChatPipeline {
    /// A pipeline with no providers: answers every chat with
    /// [`ChatError::CompletionUnavailable`] until one is attached.
    pub fn new(config: ChatConfig, context: ContextLibrary) -> Self {
        Self {
            config,
            context,
            detector: IntentDetector::new(),
            provider: None,
            classifier: None,
            weather: None,
            time: None,
            images: None,
            search: None,
        }
    }

    /// Completion provider, used for both the answer and classification calls.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.classifier = Some(Classifier::new(provider.clone(), self.config.classification.clone()));
        self.provider = Some(provider);
        self
    }

    pub fn with_weather(mut self, backend: Arc<dyn WeatherBackend>) -> Self {
        self.weather = Some(WeatherFetcher::new(backend));
        self
    }

    pub fn with_time(mut self, backend: Arc<dyn TimeBackend>) -> Self {
        self.time = Some(TimeFetcher::new(backend));
        self
    }

    /// One search backend serves both web/news search and image search.
    pub fn with_search(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.images = Some(ImageFetcher::new(backend.clone(), self.config.max_images));
        self.search = Some(SearchFetcher::new(backend, self.config.max_search_results));
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn provider_info(&self) -> Option<ProviderInfo> {
        self.provider.as_ref().map(|p| p.info())
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            completion: self.provider.is_some(),
            web_search: self.search.is_some(),
            image_search: self.images.is_some(),
            weather: self.weather.is_some(),
            time: self.time.is_some(),
            context_topics: self.context.topic_count(),
        }
    }

    pub async fn respond(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        if let Some(flag) = detect_red_flag(message) {
            tracing::info!(flag = flag.label(), "Red flag detected, returning fixed response");
            return Ok(ChatReply { response: flag.response() });
        }

        let (provider, classifier) = match (&self.provider, &self.classifier) {
            (Some(provider), Some(classifier)) => (provider, classifier),
            _ => return Err(ChatError::CompletionUnavailable),
        };

        let history = sanitize_history(&request.history);
        let mut flags = self.detector.detect(message, previous_assistant_turn(&history));
        let context = self.context.assemble(message);
        let page_block = request.page_context.as_ref().and_then(page_context_block);
        let enrichments = self.enrich(classifier, message, &mut flags).await;

        let sections = std::iter::once(context.as_str())
            .chain(page_block.as_deref())
            .chain(enrichments.iter().map(|e| e.text.as_str()));
        let system_prompt = compose_system_prompt(sections);

        tracing::debug!(
            topics = ?self.context.matched_topics(message),
            history = history.len(),
            prompt_chars = system_prompt.len(),
            "Assembled system prompt"
        );

        let messages = build_messages(system_prompt, history, message);
        let raw = provider
            .complete(&messages, &self.config.completion)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Completion call failed");
                ChatError::Completion(e)
            })?;

        let sources: Vec<&str> = enrichments.iter().map(|e| e.source.as_str()).collect();
        tracing::info!(intent = ?flags.labels(), enrichments = ?sources, "Chat response generated");
        Ok(ChatReply { response: strip_code_fences(&raw) })
    }

    /// Run the enrichments in fixed order: weather, time, images, web search.
    async fn enrich(&self, classifier: &Classifier, message: &str, flags: &mut IntentFlags) -> Vec<Enrichment> {
        let mut out = Vec::new();

        let wants_weather = flags.is_weather && self.weather.is_some();
        let wants_time = flags.is_time && self.time.is_some();
        let location = if wants_weather || wants_time {
            self.resolve_location(classifier, message, flags.location_follow_up).await
        } else {
            None
        };

        if let (true, Some(fetcher)) = (wants_weather, &self.weather) {
            let text = match &location {
                None => weather::ask_location_instruction(),
                Some(location) => {
                    let outcome = fetcher.fetch(location, classifier).await;
                    if outcome.is_empty() {
                        weather::unresolved_location_instruction(location)
                    } else {
                        outcome.text
                    }
                }
            };
            out.push(Enrichment::new(EnrichmentSource::Weather, text));
        }

        if let (true, Some(fetcher)) = (wants_time, &self.time) {
            let text = match &location {
                None => time::ask_location_instruction(),
                Some(location) => fetcher.fetch(location).await.text,
            };
            out.push(Enrichment::new(EnrichmentSource::Time, text));
        }

        if let (true, Some(fetcher)) = (flags.is_image, &self.images) {
            if let Some(outcome) = fetcher.fetch(message, classifier).await {
                let text = if outcome.is_empty() {
                    images::no_images_instruction(&outcome.resolved)
                } else {
                    outcome.text
                };
                out.push(Enrichment::new(EnrichmentSource::Images, text));
            }
        }

        // Weather and time already carry live data; no search decision for them.
        let live_data_planned = wants_weather || wants_time;
        if let (false, Some(fetcher)) = (live_data_planned, &self.search) {
            flags.needs_search = match classifier.classify(&SearchNeed, message).await {
                Ok(needed) => needed,
                Err(e) => {
                    tracing::warn!(error = %e, "Search decision failed, skipping web search");
                    false
                }
            };
            if flags.needs_search {
                if let Some(outcome) = fetcher.fetch(message, classifier).await {
                    let text = if outcome.is_empty() {
                        search::no_results_instruction(&outcome.resolved)
                    } else {
                        outcome.text
                    };
                    out.push(Enrichment::new(EnrichmentSource::WebSearch, text));
                }
            }
        }

        out
    }

    /// Location named in the message; for a follow-up with nothing extractable,
    /// the whole message is the answer to the pending question.
    async fn resolve_location(&self, classifier: &Classifier, message: &str, follow_up: bool) -> Option<String> {
        let extracted = match classifier.classify(&LocationExtraction, message).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(error = %e, "Location extraction failed");
                None
            }
        };
        let location = extracted.or_else(|| follow_up.then(|| message.to_string()));
        tracing::debug!(location = ?location, follow_up, "Resolved location");
        location
    }
}
