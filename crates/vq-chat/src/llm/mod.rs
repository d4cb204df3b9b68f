//! LLM Module - OpenAI-compatible chat completion providers
//! Used both for the visitor-facing answer and for short classification calls.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;

pub mod external;

pub use external::ExternalProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Parse a client-supplied role name. Unknown roles yield `None`.
    pub fn parse(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// External API providers speaking the OpenAI `chat/completions` dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiProvider {
    Groq,
    OpenAI,
    OpenRouter,
    Together,
    Ollama,
    Custom { endpoint: String },
}

impl ApiProvider {
    /// Resolve the alternate-provider toggle. Anything that looks like a URL is
    /// treated as a custom OpenAI-compatible endpoint.
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Some(Self::Custom { endpoint: trimmed.to_string() });
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "openai" => Some(Self::OpenAI),
            "openrouter" => Some(Self::OpenRouter),
            "together" => Some(Self::Together),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            ApiProvider::Groq => "https://api.groq.com/openai/v1/chat/completions".to_string(),
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions".to_string(),
            ApiProvider::Together => "https://api.together.xyz/v1/chat/completions".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ApiProvider::Groq => crate::config::DEFAULT_MODEL,
            ApiProvider::OpenAI => "gpt-4o-mini",
            ApiProvider::OpenRouter => "meta-llama/llama-3.3-70b-instruct",
            ApiProvider::Together => "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            ApiProvider::Ollama => "llama3.1",
            ApiProvider::Custom { .. } => crate::config::DEFAULT_MODEL,
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn key_variable(&self) -> &'static str {
        match self {
            ApiProvider::Groq => "GROQ_API_KEY",
            ApiProvider::OpenAI => "OPENAI_API_KEY",
            ApiProvider::OpenRouter => "OPENROUTER_API_KEY",
            ApiProvider::Together => "TOGETHER_API_KEY",
            ApiProvider::Ollama => "OLLAMA_API_KEY",
            ApiProvider::Custom { .. } => "VQ_CUSTOM_API_KEY",
        }
    }

    /// Local endpoints run without a credential.
    pub fn requires_key(&self) -> bool {
        !matches!(self, ApiProvider::Ollama)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::Groq => "Groq",
            ApiProvider::OpenAI => "OpenAI",
            ApiProvider::OpenRouter => "OpenRouter",
            ApiProvider::Together => "Together",
            ApiProvider::Ollama => "Ollama",
            ApiProvider::Custom { .. } => "Custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

/// Core trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Submit an ordered message list and return the generated text.
    async fn complete(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String>;

    fn info(&self) -> ProviderInfo;
}
