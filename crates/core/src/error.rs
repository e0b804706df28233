//! Error types for the aiservices domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The top-level [`Error`]
//! mirrors the failure taxonomy of an invocation: configuration mistakes,
//! content-policy rejections, collaborator failures, and broken invariants.

use thiserror::Error;

/// The top-level error type for all aiservices operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator failures (model, moderation, retrieval) ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool executor failures ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Ambiguous or missing configuration, raised before any model call ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Moderation flagged the conversation ---
    #[error("Content policy violation: {flagged_text}")]
    ContentPolicy { flagged_text: String },

    // --- Model output could not be converted into the declared shape ---
    #[error("Output parsing failed: {0}")]
    OutputParsing(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Broken invariants (iteration ceiling, unreachable states) ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error was raised by configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Moderation failed: {0}")]
    Moderation(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn content_policy_carries_flagged_text() {
        let err = Error::ContentPolicy {
            flagged_text: "something nasty".into(),
        };
        assert!(err.to_string().contains("something nasty"));
        assert!(!err.is_config());
    }

    #[test]
    fn config_shorthand() {
        let err = Error::config("no user message");
        assert!(err.is_config());
        assert_eq!(err.to_string(), "Configuration error: no user message");
    }
}
