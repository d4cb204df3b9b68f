//! Process environment → provider wiring.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use vq_chat::enrich::time::DEFAULT_TIME_API_URL;
use vq_chat::{
    ApiProvider, BraveSearch, ChatConfig, ChatPipeline, ContextLibrary, ExternalProvider, OpenWeatherMap,
    WorldTimeApi,
};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub provider: ApiProvider,
    pub completion_key: Option<String>,
    pub model: Option<String>,
    pub brave_key: Option<String>,
    pub openweather_key: Option<String>,
    pub time_api_url: String,
    pub context_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("VQ_PROVIDER") {
            Some(name) => ApiProvider::from_name(&name)
                .ok_or_else(|| anyhow!("Unknown VQ_PROVIDER '{}' (expected groq, openai, openrouter, together, ollama or a URL)", name))?,
            None => ApiProvider::Groq,
        };

        Ok(Self {
            bind_addr: get("VQ_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            completion_key: get(provider.key_variable()),
            provider,
            model: get("VQ_MODEL"),
            brave_key: get("BRAVE_API_KEY"),
            openweather_key: get("OPENWEATHER_API_KEY"),
            time_api_url: get("VQ_TIME_API_URL").unwrap_or_else(|| DEFAULT_TIME_API_URL.to_string()),
            context_dir: get("VQ_CONTEXT_DIR").map(PathBuf::from),
            config_path: get("VQ_CONFIG").map(PathBuf::from),
        })
    }

    pub fn completion_configured(&self) -> bool {
        self.completion_key.is_some() || !self.provider.requires_key()
    }

    pub fn chat_config(&self) -> Result<ChatConfig> {
        let mut config = match &self.config_path {
            Some(path) => ChatConfig::from_file(path)
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            None => ChatConfig::default().with_model(self.provider.default_model()),
        };
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(dir) = &self.context_dir {
            config.context_dir = dir.clone();
        }
        Ok(config)
    }

    /// Construct every configured provider. Missing optional credentials
    /// disable only their fetcher.
    pub fn build_pipeline(&self) -> Result<ChatPipeline> {
        let config = self.chat_config()?;
        let context = ContextLibrary::load(&config.context_dir);
        let timeout = config.enrichment_timeout_secs;
        let model = config.completion.model.clone();
        let mut pipeline = ChatPipeline::new(config, context);

        if self.completion_configured() {
            let provider = ExternalProvider::new(self.provider.clone(), self.completion_key.clone(), model)?;
            pipeline = pipeline.with_provider(Arc::new(provider));
        } else {
            tracing::warn!(
                key = self.provider.key_variable(),
                "Completion credential not set; /chat will answer 503 until it is"
            );
        }

        match &self.openweather_key {
            Some(key) => pipeline = pipeline.with_weather(Arc::new(OpenWeatherMap::new(key.clone(), timeout)?)),
            None => tracing::info!("OPENWEATHER_API_KEY not set; weather lookups disabled"),
        }

        match &self.brave_key {
            Some(key) => pipeline = pipeline.with_search(Arc::new(BraveSearch::new(key.clone(), timeout)?)),
            None => tracing::info!("BRAVE_API_KEY not set; web and image search disabled"),
        }

        pipeline = pipeline.with_time(Arc::new(WorldTimeApi::new(&self.time_api_url, timeout)?));

        let caps = pipeline.capabilities();
        tracing::info!(
            provider = self.provider.name(),
            completion = caps.completion,
            web_search = caps.web_search,
            weather = caps.weather,
            time = caps.time,
            context_topics = caps.context_topics,
            "Chat pipeline ready"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<ServerSettings> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerSettings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.provider, ApiProvider::Groq);
        assert!(!s.completion_configured());
        assert_eq!(s.time_api_url, DEFAULT_TIME_API_URL);

        let config = s.chat_config().unwrap();
        assert_eq!(config.completion.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_alternate_provider_reads_its_own_key() {
        let s = settings(&[("VQ_PROVIDER", "openai"), ("GROQ_API_KEY", "gsk_x"), ("OPENAI_API_KEY", "sk-y")]).unwrap();
        assert_eq!(s.provider, ApiProvider::OpenAI);
        assert_eq!(s.completion_key.as_deref(), Some("sk-y"));
        assert_eq!(s.chat_config().unwrap().classification.model, "gpt-4o-mini");

        let s = settings(&[("VQ_PROVIDER", "ollama")]).unwrap();
        assert!(s.completion_configured());
    }

    #[test]
    fn test_blank_values_are_unset_and_unknown_provider_fails() {
        let s = settings(&[("GROQ_API_KEY", "  "), ("VQ_MODEL", "llama-3.1-8b-instant")]).unwrap();
        assert!(s.completion_key.is_none());
        assert_eq!(s.chat_config().unwrap().completion.model, "llama-3.1-8b-instant");

        assert!(settings(&[("VQ_PROVIDER", "bard")]).is_err());
    }

    #[test]
    fn test_pipeline_without_credentials_still_builds() {
        let s = settings(&[("VQ_CONTEXT_DIR", "/nonexistent/vq-context")]).unwrap();
        let pipeline = s.build_pipeline().unwrap();
        let caps = pipeline.capabilities();
        assert!(!caps.completion);
        assert!(!caps.weather && !caps.web_search);
        assert!(caps.time);
    }
}
