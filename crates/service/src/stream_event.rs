//! Events emitted by a running token stream.
//!
//! - `chunk`       — partial text from the model
//! - `tool_call`   — a requested tool is about to run
//! - `tool_result` — the tool finished
//! - `done`        — the stream completed; always the last event
//! - `error`       — the stream failed; always the last event

use aiservices_core::error::{Error, ProviderError};
use aiservices_core::model::{FinishReason, TokenUsage};
use aiservices_core::retrieval::RetrievedContent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult { id: String, name: String, output: String },

    /// Final metadata of a completed stream.
    Done {
        conversation_id: String,
        usage: Option<TokenUsage>,
        finish_reason: Option<FinishReason>,
        model_calls: usize,
        tool_executions: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sources: Option<Vec<RetrievedContent>>,
    },

    Error { kind: StreamErrorKind, message: String },
}

/// Coarse classification of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    Config,
    /// `message` is the flagged text
    ContentPolicy,
    Provider,
    Other,
}

impl StreamEvent {
    /// SSE-style event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// The terminal event for a failed stream.
    pub fn from_error(error: &Error) -> Self {
        let (kind, message) = match error {
            Error::Config { message } => (StreamErrorKind::Config, message.clone()),
            Error::ContentPolicy { flagged_text } => (StreamErrorKind::ContentPolicy, flagged_text.clone()),
            Error::Provider(e) => (StreamErrorKind::Provider, e.to_string()),
            other => (StreamErrorKind::Other, other.to_string()),
        };
        Self::Error { kind, message }
    }

    /// Turn an `error` event back into an [`Error`]; `None` for other events.
    pub fn into_error(self) -> Option<Error> {
        let Self::Error { kind, message } = self else {
            return None;
        };
        Some(match kind {
            StreamErrorKind::Config => Error::Config { message },
            StreamErrorKind::ContentPolicy => Error::ContentPolicy { flagged_text: message },
            StreamErrorKind::Provider => Error::Provider(ProviderError::StreamInterrupted(message)),
            StreamErrorKind::Other => Error::Internal(message),
        })
    }
}
