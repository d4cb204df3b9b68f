use thiserror::Error;

/// Failures that end a chat request without a model-generated answer.
///
/// Provider hiccups during enrichment or classification never show up here;
/// those degrade inside the pipeline.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No message provided")]
    EmptyMessage,
    #[error("Completion provider is not configured")]
    CompletionUnavailable,
    #[error("Completion provider failed: {0:#}")]
    Completion(#[source] anyhow::Error),
}

impl ChatError {
    /// Stable machine-readable identifier returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::EmptyMessage => "empty_message",
            ChatError::CompletionUnavailable => "completion_unavailable",
            ChatError::Completion(_) => "completion_failed",
        }
    }

    /// Whether the caller sent something unusable, as opposed to a server-side fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::EmptyMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ChatError::EmptyMessage.code(), "empty_message");
        assert_eq!(ChatError::CompletionUnavailable.code(), "completion_unavailable");
        let err = ChatError::Completion(anyhow::anyhow!("API error (401): bad key"));
        assert_eq!(err.code(), "completion_failed");
        assert!(err.to_string().contains("401"));
        assert!(!err.is_client_error());
        assert!(ChatError::EmptyMessage.is_client_error());
    }
}
