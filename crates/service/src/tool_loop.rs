//! The tool execution loop.
//!
//! ```text
//! AWAITING_MODEL ──(tool requests)──▶ EXECUTING_TOOLS ──▶ AWAITING_MODEL
//!        │
//!        └──(no tool requests)──▶ DONE
//! ```
//!
//! Every assistant turn and every tool result is appended to the transcript
//! as soon as it exists, so a failure leaves the log consistent with what
//! actually happened. Tools run one at a time, in the order requested.

use aiservices_core::error::{Error, Result};
use aiservices_core::event::{DomainEvent, EventBus};
use aiservices_core::message::{AssistantMessage, ChatMessage, ConversationId, ToolRequest};
use aiservices_core::model::{ChatModel, ChatRequest, ModelResponse, ResponseFormat, TokenUsage};
use aiservices_core::tool::{ToolCatalog, ToolExecution};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream_event::StreamEvent;
use crate::transcript::Transcript;

/// Upper bound on model calls in one invocation.
pub const MAX_SEQUENTIAL_TOOL_EXECUTIONS: usize = 100;

/// Result of a finished loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The last model response (the one without tool requests)
    pub response: ModelResponse,
    /// Usage summed over every model call
    pub usage: Option<TokenUsage>,
    pub tool_executions: Vec<ToolExecution>,
    pub model_calls: usize,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolRequest>),
    Done(ModelResponse),
}

/// One invocation's model/tool conversation.
pub struct ToolLoop {
    model: Arc<dyn ChatModel>,
    catalog: ToolCatalog,
    conversation_id: ConversationId,
    response_format: Option<ResponseFormat>,
    max_model_calls: usize,
    events: Arc<EventBus>,
}

impl ToolLoop {
    pub fn new(model: Arc<dyn ChatModel>, catalog: ToolCatalog, conversation_id: ConversationId, events: Arc<EventBus>) -> Self {
        Self {
            model,
            catalog,
            conversation_id,
            response_format: None,
            max_model_calls: MAX_SEQUENTIAL_TOOL_EXECUTIONS,
            events,
        }
    }

    /// Attach `format` to every model call.
    pub fn with_response_format(mut self, format: Option<ResponseFormat>) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_max_model_calls(mut self, max: usize) -> Self {
        self.max_model_calls = max;
        self
    }

    /// Run to completion with complete (non-streaming) model calls.
    pub async fn run(&self, transcript: &mut Transcript) -> Result<LoopOutcome> {
        self.drive(transcript, None).await
    }

    /// Run to completion with streaming model calls, forwarding text and
    /// tool progress to `events`. The terminal event is left to the caller.
    pub async fn run_streaming(&self, transcript: &mut Transcript, events: &mpsc::Sender<StreamEvent>) -> Result<LoopOutcome> {
        self.drive(transcript, Some(events)).await
    }

    async fn drive(&self, transcript: &mut Transcript, progress: Option<&mpsc::Sender<StreamEvent>>) -> Result<LoopOutcome> {
        let mut usage: Option<TokenUsage> = None;
        let mut trace: Vec<ToolExecution> = Vec::new();
        let mut model_calls = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let request = ChatRequest {
                        messages: transcript.messages(),
                        tools: self.catalog.specifications(),
                        response_format: self.response_format.clone(),
                    };
                    model_calls += 1;
                    debug!(
                        conversation_id = %self.conversation_id,
                        iteration = model_calls,
                        messages = request.messages.len(),
                        memory = transcript.uses_memory(),
                        "Calling model"
                    );

                    let response = match progress {
                        Some(tx) => self.stream_once(request, tx).await?,
                        None => self.model.chat(request).await?,
                    };
                    usage = TokenUsage::sum(usage, response.usage);

                    self.events.publish(DomainEvent::ModelCalled {
                        conversation_id: self.conversation_id.to_string(),
                        model: self.model.name().to_string(),
                        tokens_used: response.usage.map(|u| u.total_tokens()).unwrap_or(0),
                        tool_requests: response.message.tool_requests.len(),
                        timestamp: Utc::now(),
                    });

                    transcript.push(response.message.clone());

                    if response.message.has_tool_requests() {
                        if model_calls >= self.max_model_calls {
                            warn!(
                                conversation_id = %self.conversation_id,
                                iterations = model_calls,
                                "Tool loop ceiling reached"
                            );
                            return Err(Error::Internal(format!(
                                "Something is wrong, exceeded {} sequential tool executions",
                                self.max_model_calls
                            )));
                        }
                        LoopState::ExecutingTools(response.message.tool_requests)
                    } else {
                        LoopState::Done(response)
                    }
                }

                LoopState::ExecutingTools(requests) => {
                    for request in &requests {
                        let record = self.execute(request, transcript, progress).await?;
                        trace.push(record);
                    }
                    LoopState::AwaitingModel
                }

                LoopState::Done(response) => {
                    info!(
                        conversation_id = %self.conversation_id,
                        model_calls,
                        tool_executions = trace.len(),
                        "Tool loop finished"
                    );
                    return Ok(LoopOutcome {
                        response,
                        usage,
                        tool_executions: trace,
                        model_calls,
                    });
                }
            };
        }
    }

    /// Execute one requested tool and append its result.
    async fn execute(
        &self,
        request: &ToolRequest,
        transcript: &mut Transcript,
        progress: Option<&mpsc::Sender<StreamEvent>>,
    ) -> Result<ToolExecution> {
        let executor = self
            .catalog
            .executor(&request.name)
            .ok_or_else(|| Error::config(format!("No executor registered for tool '{}'", request.name)))?;

        if let Some(tx) = progress {
            let _ = tx
                .send(StreamEvent::ToolCall {
                    id: request.id.clone(),
                    name: request.name.clone(),
                    input: request.arguments_json(),
                })
                .await;
        }

        let start = std::time::Instant::now();
        let result = executor.execute(request, &self.conversation_id).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.events.publish(DomainEvent::ToolExecuted {
            conversation_id: self.conversation_id.to_string(),
            tool_name: request.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %request.name, error = %e, "Tool execution failed");
                return Err(e.into());
            }
        };
        debug!(tool = %request.name, duration_ms, "Tool executed");

        transcript.push(ChatMessage::tool_result(request, output.clone()));

        if let Some(tx) = progress {
            let _ = tx
                .send(StreamEvent::ToolResult {
                    id: request.id.clone(),
                    name: request.name.clone(),
                    output: output.clone(),
                })
                .await;
        }

        Ok(ToolExecution {
            request: request.clone(),
            result: output,
        })
    }

    /// One streaming model call, accumulated into a complete response.
    async fn stream_once(&self, request: ChatRequest, tx: &mpsc::Sender<StreamEvent>) -> Result<ModelResponse> {
        let mut chunks = self.model.stream(request).await?;

        let mut text = String::new();
        let mut tool_requests: Vec<ToolRequest> = Vec::new();
        let mut usage = None;
        let mut finish_reason = None;

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;

            if let Some(content) = chunk.content
                && !content.is_empty()
            {
                text.push_str(&content);
                let _ = tx.send(StreamEvent::Chunk { content }).await;
            }

            // Deltas sharing an id extend the same request.
            for delta in chunk.tool_requests {
                match tool_requests.iter_mut().find(|r| r.id == delta.id) {
                    Some(existing) => existing.arguments.push_str(&delta.arguments),
                    None => tool_requests.push(delta),
                }
            }

            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.finish_reason.is_some() {
                finish_reason = chunk.finish_reason;
            }
            if chunk.done {
                break;
            }
        }

        Ok(ModelResponse {
            message: AssistantMessage {
                text: (!text.is_empty()).then_some(text),
                tool_requests,
            },
            usage,
            finish_reason,
        })
    }
}
