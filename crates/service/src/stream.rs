//! Token streams and stream adapters.
//!
//! A [`TokenStream`] is returned unstarted and holds no conversation lock.
//! [`TokenStream::start`] spawns a task that locks the conversation log,
//! appends the opening messages, launches moderation and runs the streaming
//! tool loop; the lock is released just before the terminal event.

use aiservices_core::error::{Error, Result};
use aiservices_core::event::EventBus;
use aiservices_core::memory::ChatMemoryStore;
use aiservices_core::message::{ChatMessage, ConversationId};
use aiservices_core::model::{FinishReason, TokenUsage};
use aiservices_core::moderation::ModerationModel;
use aiservices_core::output::ResultShape;
use aiservices_core::retrieval::RetrievedContent;
use futures::{Stream, StreamExt};
use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::moderation::PendingModeration;
use crate::service::{publish_completed, publish_failure};
use crate::stream_event::StreamEvent;
use crate::tool_loop::ToolLoop;
use crate::transcript::Transcript;

/// Target name of [`TextStreamAdapter`].
pub const TEXT_STREAM: &str = "text_stream";

/// Whatever a [`StreamAdapter`] built; downcast with
/// [`InvocationOutput::into_adapted`](crate::InvocationOutput::into_adapted).
pub type AdaptedStream = Box<dyn Any + Send>;

/// Text chunks of a token stream; a failed stream yields one `Err` last.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Builds a caller-facing value from a token stream.
pub trait StreamAdapter: Send + Sync {
    fn can_adapt(&self, shape: &ResultShape) -> bool;

    fn adapt(&self, stream: TokenStream) -> AdaptedStream;
}

/// Adapts a token stream to a [`TextStream`] for
/// `ResultShape::Adapted { target: "text_stream" }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStreamAdapter;

impl StreamAdapter for TextStreamAdapter {
    fn can_adapt(&self, shape: &ResultShape) -> bool {
        matches!(shape, ResultShape::Adapted { target } if target == TEXT_STREAM)
    }

    fn adapt(&self, stream: TokenStream) -> AdaptedStream {
        // Started on first poll.
        let text: TextStream = Box::pin(
            futures::stream::once(async move { stream.into_stream() })
                .flatten()
                .filter_map(|event| {
                    futures::future::ready(match event {
                        StreamEvent::Chunk { content } => Some(Ok(content)),
                        failed @ StreamEvent::Error { .. } => failed.into_error().map(Err),
                        _ => None,
                    })
                }),
        );
        Box::new(text)
    }
}

/// Everything a stream needs once started.
pub(crate) struct StreamLaunch {
    pub tool_loop: ToolLoop,
    pub memory: Option<Arc<dyn ChatMemoryStore>>,
    /// System and user messages of the invocation
    pub opening: Vec<ChatMessage>,
    pub moderation_model: Option<Arc<dyn ModerationModel>>,
    pub sources: Option<Vec<RetrievedContent>>,
    pub conversation_id: ConversationId,
    pub capacity: usize,
    pub events: Arc<EventBus>,
}

/// A live, lazily started stream of one invocation's output.
pub struct TokenStream {
    launch: StreamLaunch,
}

impl TokenStream {
    pub(crate) fn new(launch: StreamLaunch) -> Self {
        Self { launch }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.launch.conversation_id
    }

    /// Spawn the stream and receive its events. The last event is always
    /// `Done` or `Error`.
    pub fn start(self) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.launch.capacity.max(1));
        tokio::spawn(run(self.launch, tx));
        rx
    }

    /// [`start`](Self::start), as a `futures` stream.
    pub fn into_stream(self) -> ReceiverStream<StreamEvent> {
        ReceiverStream::new(self.start())
    }

    /// Start the stream and wait for it to finish.
    pub async fn collect(self) -> Result<CollectedStream> {
        let mut rx = self.start();
        let mut text = String::new();

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk { content } => text.push_str(&content),
                StreamEvent::Done {
                    usage,
                    finish_reason,
                    model_calls,
                    tool_executions,
                    sources,
                    ..
                } => {
                    return Ok(CollectedStream {
                        text,
                        usage,
                        finish_reason,
                        model_calls,
                        tool_executions,
                        sources,
                    });
                }
                failed @ StreamEvent::Error { .. } => {
                    return Err(failed
                        .into_error()
                        .unwrap_or_else(|| Error::Internal("stream failed".into())));
                }
                StreamEvent::ToolCall { .. } | StreamEvent::ToolResult { .. } => {}
            }
        }

        Err(Error::Internal("Stream ended without a terminal event".into()))
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("conversation_id", &self.launch.conversation_id)
            .field("memory", &self.launch.memory.is_some())
            .field("opening", &self.launch.opening.len())
            .finish()
    }
}

/// A finished stream, gathered by [`TokenStream::collect`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedStream {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    pub model_calls: usize,
    pub tool_executions: usize,
    pub sources: Option<Vec<RetrievedContent>>,
}

async fn run(launch: StreamLaunch, tx: mpsc::Sender<StreamEvent>) {
    let StreamLaunch {
        tool_loop,
        memory,
        opening,
        moderation_model,
        sources,
        conversation_id,
        events,
        ..
    } = launch;

    let log = match &memory {
        Some(store) => Some(store.acquire(&conversation_id).await),
        None => None,
    };
    let mut transcript = Transcript::open(log, opening);
    let moderation = moderation_model.map(|model| PendingModeration::launch(model, &transcript.messages()));

    debug!(conversation_id = %conversation_id, "Token stream started");

    let result = match tool_loop.run_streaming(&mut transcript, &tx).await {
        Ok(outcome) => match moderation {
            Some(pending) => pending.verify().await.map(|()| outcome),
            None => Ok(outcome),
        },
        Err(e) => Err(e),
    };

    // Release the conversation log before the consumer hears we are done.
    drop(transcript);

    let terminal = match result {
        Ok(outcome) => {
            publish_completed(&events, &conversation_id, &outcome);
            StreamEvent::Done {
                conversation_id: conversation_id.to_string(),
                usage: outcome.usage,
                finish_reason: outcome.response.finish_reason,
                model_calls: outcome.model_calls,
                tool_executions: outcome.tool_executions.len(),
                sources,
            }
        }
        Err(e) => {
            publish_failure(&events, &conversation_id, &e);
            StreamEvent::from_error(&e)
        }
    };
    let _ = tx.send(terminal).await;
}
