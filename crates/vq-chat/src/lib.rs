pub mod classify;
pub mod config;
pub mod context;
pub mod enrich;
pub mod error;
pub mod guard;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use config::{ChatConfig, GenerationConfig};
pub use context::ContextLibrary;
pub use error::ChatError;
pub use pipeline::ChatPipeline;
pub use types::{Capabilities, ChatReply, ChatRequest, ErrorReply, HistoryEntry, PageContext};

// Re-export provider types
pub use enrich::{BraveSearch, OpenWeatherMap, WorldTimeApi};
pub use llm::{ApiProvider, ChatMessage, ChatRole, CompletionProvider, ExternalProvider, ProviderInfo};

// Re-export common types
pub use anyhow::{Error, Result};
