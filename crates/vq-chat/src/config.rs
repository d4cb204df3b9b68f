use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::enrich::images::MAX_IMAGES;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Decoding parameters for a single completion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub top_p: f32,
    /// Whole-request timeout for this call, independent of every other call.
    pub timeout_secs: u64,
}

impl GenerationConfig {
    /// Settings for the visitor-facing answer.
    pub fn completion() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1200,
            top_p: 0.9,
            timeout_secs: 30,
        }
    }

    /// Settings for short fixed-format classification replies.
    pub fn classification() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 60,
            top_p: 1.0,
            timeout_secs: 10,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn validate(&self, name: &str) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err(format!("{}.model must not be empty", name));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("{}.temperature must be in [0.0, 2.0]", name));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(format!("{}.top_p must be in (0.0, 1.0]", name));
        }
        if self.max_tokens == 0 {
            return Err(format!("{}.max_tokens must be > 0", name));
        }
        if self.timeout_secs == 0 {
            return Err(format!("{}.timeout_secs must be > 0", name));
        }
        Ok(())
    }
}

/// Fields a config file may set on a [`GenerationConfig`]; the rest keep the
/// defaults of the call the section belongs to.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GenerationOverrides {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    top_p: Option<f32>,
    timeout_secs: Option<u64>,
}

impl GenerationOverrides {
    fn apply(self, base: GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            model: self.model.unwrap_or(base.model),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            top_p: self.top_p.unwrap_or(base.top_p),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

fn completion_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GenerationConfig, D::Error> {
    GenerationOverrides::deserialize(deserializer).map(|o| o.apply(GenerationConfig::completion()))
}

fn classification_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GenerationConfig, D::Error> {
    GenerationOverrides::deserialize(deserializer).map(|o| o.apply(GenerationConfig::classification()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    #[serde(deserialize_with = "completion_section")]
    pub completion: GenerationConfig,
    #[serde(deserialize_with = "classification_section")]
    pub classification: GenerationConfig,
    /// Timeout applied to each weather/time/search provider call.
    pub enrichment_timeout_secs: u64,
    /// Directory holding `core_identity.txt` and the per-topic blobs.
    pub context_dir: PathBuf,
    pub max_images: usize,
    pub max_search_results: usize,
}

impl ChatConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        self.completion.validate("completion")?;
        self.classification.validate("classification")?;
        if self.enrichment_timeout_secs == 0 {
            return Err("enrichment_timeout_secs must be > 0".into());
        }
        if self.max_images == 0 || self.max_images > MAX_IMAGES {
            return Err(format!("max_images must be in 1..={}", MAX_IMAGES));
        }
        if self.max_search_results == 0 {
            return Err("max_search_results must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Point both the answer and the classification calls at one model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.completion.model = model.to_string();
        self.classification.model = model.to_string();
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            completion: GenerationConfig::completion(),
            classification: GenerationConfig::classification(),
            enrichment_timeout_secs: 8,
            context_dir: PathBuf::from("context"),
            max_images: 2,
            max_search_results: 6,
        }
    }
}
