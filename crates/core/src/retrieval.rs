//! RetrievalAugmentor trait: retrieval-based enrichment of the user message.
//!
//! The retrieval algorithm (vector search, reranking, ...) is not part of
//! this workspace; only the request/response contract is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ChatMessage, ConversationId, UserMessage};

/// Conversation context handed to the augmentor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationMetadata {
    pub conversation_id: ConversationId,

    /// Current history, present only when memory is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationRequest {
    /// Text-only view of the user message
    pub user_message: UserMessage,

    pub metadata: AugmentationMetadata,
}

/// A piece of retrieved content attributed to retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContent {
    pub text: String,

    /// Source attribution (document id, url, score, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RetrievedContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationResult {
    /// The possibly rewritten user message
    pub user_message: UserMessage,

    /// Retrieved sources, in retrieval order
    #[serde(default)]
    pub contents: Vec<RetrievedContent>,
}

#[async_trait]
pub trait RetrievalAugmentor: Send + Sync {
    async fn augment(
        &self,
        request: AugmentationRequest,
    ) -> std::result::Result<AugmentationResult, ProviderError>;
}
