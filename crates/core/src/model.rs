//! ChatModel trait: the abstraction over language model backends.
//!
//! A chat model knows how to send a message set (plus optional tool
//! specifications and response format) to an LLM and get an assistant
//! message back, either as a complete response or as a stream of chunks.
//! Concrete backends live outside this workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{AssistantMessage, ChatMessage, ToolRequest};
use crate::tool::ToolSpecification;

/// A named JSON schema used to constrain model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// How the model must format its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    Json { schema: JsonSchema },
}

/// One call to a chat model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// Tools the model may request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpecification>,

    /// Schema constraint, absent for free-form answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Sum two optional usages; absent on both sides stays absent.
    pub fn sum(a: Option<TokenUsage>, b: Option<TokenUsage>) -> Option<TokenUsage> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a + b),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

/// Why a single model call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    ToolCall,
    Length,
    Other,
}

/// A complete (non-streaming) response from a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated message
    pub message: AssistantMessage,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ModelResponse {
    pub fn new(message: AssistantMessage) -> Self {
        Self {
            message,
            usage: None,
            finish_reason: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// Optional features a model advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Accepts `ResponseFormat::Json` with a schema
    JsonSchemaResponseFormat,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool request deltas; deltas sharing an id are concatenated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

pub type ChunkReceiver = tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core chat model trait.
///
/// The invocation pipeline calls `chat()` or `stream()` without knowing which
/// backend answers. Failures are returned as [`ProviderError`] and are never
/// retried by the pipeline.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// A human-readable name for this model client.
    fn name(&self) -> &str;

    /// Capabilities this model supports. Defaults to none.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Send a request and get a complete response.
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ModelResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `chat()` and wraps the result as a single chunk.
    async fn stream(&self, request: ChatRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.chat(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.message.text,
                tool_requests: response.message.tool_requests,
                done: true,
                usage: response.usage,
                finish_reason: response.finish_reason,
            }))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel;

    #[async_trait]
    impl ChatModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(&self, _request: ChatRequest) -> std::result::Result<ModelResponse, ProviderError> {
            Ok(ModelResponse::new(AssistantMessage::from_text("hello"))
                .with_usage(TokenUsage::new(3, 2))
                .with_finish_reason(FinishReason::Stop))
        }
    }

    #[test]
    fn usage_sum_handles_absence() {
        let a = Some(TokenUsage::new(10, 5));
        let b = Some(TokenUsage::new(7, 3));
        assert_eq!(TokenUsage::sum(a, b), Some(TokenUsage::new(17, 8)));
        assert_eq!(TokenUsage::sum(a, None), a);
        assert_eq!(TokenUsage::sum(None, b), b);
        assert_eq!(TokenUsage::sum(None, None), None);
        assert_eq!(TokenUsage::new(17, 8).total_tokens(), 25);
    }

    #[test]
    fn finish_reason_wire_names() {
        let json = serde_json::to_string(&FinishReason::ToolCall).unwrap();
        assert_eq!(json, r#""TOOL_CALL""#);
    }

    #[test]
    fn default_capabilities_are_empty() {
        assert!(!FixedModel.supports(Capability::JsonSchemaResponseFormat));
    }

    #[tokio::test]
    async fn default_stream_wraps_chat() {
        let mut rx = FixedModel.stream(ChatRequest::default()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("hello"));
        assert!(chunk.done);
        assert_eq!(chunk.usage, Some(TokenUsage::new(3, 2)));
        assert!(rx.recv().await.is_none());
    }
}
