//! Scripted collaborators: a chat model, tool executor, moderation model and
//! retrieval augmentor that answer from a fixed script and record what they
//! were asked.
//!
//! Used by the test suites and by `aiservices replay`.

use aiservices_core::error::{ProviderError, ToolError};
use aiservices_core::message::{ChatMessage, ConversationId, ToolRequest, UserMessage};
use aiservices_core::model::{Capability, ChatModel, ChatRequest, ChunkReceiver, ModelResponse, StreamChunk};
use aiservices_core::moderation::{Moderation, ModerationModel};
use aiservices_core::retrieval::{AugmentationRequest, AugmentationResult, RetrievalAugmentor, RetrievedContent};
use aiservices_core::tool::ToolExecutor;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A chat model that returns queued responses in order.
///
/// Once the queue is empty it keeps returning the `repeat` response if one
/// was set, and fails otherwise.
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<ChatRequest>>,
    capabilities: Vec<Capability>,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            capabilities: Vec::new(),
        }
    }

    /// Answers every call with `response`.
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next(&self, request: ChatRequest) -> Result<ModelResponse, ProviderError> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| ProviderError::NotConfigured("the model script has no more responses".into()))
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn chat(&self, request: ChatRequest) -> Result<ModelResponse, ProviderError> {
        self.next(request)
    }

    /// Streams the scripted text word by word; tool requests, usage and the
    /// finish reason arrive with the final chunk.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.next(request)?;
        let text = response.message.text.clone().unwrap_or_default();
        let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();

        let (tx, rx) = tokio::sync::mpsc::channel(words.len() + 1);
        for word in words {
            let _ = tx.try_send(Ok(StreamChunk {
                content: Some(word),
                ..StreamChunk::default()
            }));
        }
        let _ = tx.try_send(Ok(StreamChunk {
            content: None,
            tool_requests: response.message.tool_requests,
            done: true,
            usage: response.usage,
            finish_reason: response.finish_reason,
        }));
        Ok(rx)
    }
}

/// A tool executor that returns a fixed result.
pub struct ScriptedToolExecutor {
    outcome: Result<String, String>,
    calls: Mutex<Vec<(ToolRequest, ConversationId)>>,
}

impl ScriptedToolExecutor {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            outcome: Ok(result.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every execution with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every (request, conversation) executed so far.
    pub fn calls(&self) -> Vec<(ToolRequest, ConversationId)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedToolExecutor {
    async fn execute(&self, request: &ToolRequest, conversation_id: &ConversationId) -> Result<String, ToolError> {
        lock(&self.calls).push((request.clone(), conversation_id.clone()));
        self.outcome.clone().map_err(|reason| ToolError::ExecutionFailed {
            tool_name: request.name.clone(),
            reason,
        })
    }
}

/// A moderation model with a fixed verdict.
pub struct ScriptedModeration {
    outcome: Result<Moderation, String>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModeration {
    fn with_outcome(outcome: Result<Moderation, String>) -> Self {
        Self {
            outcome,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn clean() -> Self {
        Self::with_outcome(Ok(Moderation::not_flagged()))
    }

    pub fn flagging(text: impl Into<String>) -> Self {
        Self::with_outcome(Ok(Moderation::flagged(text)))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_outcome(Err(reason.into()))
    }

    /// Take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The message sets moderated so far.
    pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl ModerationModel for ScriptedModeration {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn moderate(&self, messages: &[ChatMessage]) -> Result<Moderation, ProviderError> {
        lock(&self.seen).push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map_err(ProviderError::Moderation)
    }
}

/// A retrieval augmentor that rewrites the user text to a fixed value.
pub struct ScriptedAugmentor {
    outcome: Result<String, String>,
    sources: Vec<RetrievedContent>,
    requests: Mutex<Vec<AugmentationRequest>>,
}

impl ScriptedAugmentor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            sources: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            ..Self::new("")
        }
    }

    pub fn with_source(mut self, source: RetrievedContent) -> Self {
        self.sources.push(source);
        self
    }

    pub fn requests(&self) -> Vec<AugmentationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl RetrievalAugmentor for ScriptedAugmentor {
    async fn augment(&self, request: AugmentationRequest) -> Result<AugmentationResult, ProviderError> {
        let name = request.user_message.name.clone();
        lock(&self.requests).push(request);

        let text = self.outcome.clone().map_err(ProviderError::Retrieval)?;
        let mut user_message = UserMessage::from_text(text);
        user_message.name = name;
        Ok(AugmentationResult {
            user_message,
            contents: self.sources.clone(),
        })
    }
}
