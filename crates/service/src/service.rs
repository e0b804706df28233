//! `AiService`: the single entry point that runs one invocation through
//! assembly, augmentation, moderation, response selection, the tool loop
//! and finalization.

use aiservices_config::ServiceConfig;
use aiservices_core::error::{Error, Result};
use aiservices_core::event::{DomainEvent, EventBus};
use aiservices_core::memory::ChatMemoryStore;
use aiservices_core::message::{ChatMessage, Content, ConversationId, UserMessage};
use aiservices_core::model::{ChatModel, ChatRequest, TokenUsage};
use aiservices_core::moderation::ModerationModel;
use aiservices_core::output::{DefaultOutputParser, DefaultSchemaDeriver, OutputParser, ResultShape, SchemaDeriver};
use aiservices_core::retrieval::RetrievalAugmentor;
use aiservices_core::template::{PromptTemplate, TemplateRenderer};
use aiservices_core::tool::{ToolCatalog, ToolProvider};
use aiservices_memory::InMemoryChatMemoryStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assembly::{AssembledRequest, RequestAssembler, SystemMessageProvider};
use crate::augmentation::augment;
use crate::catalog::ToolSource;
use crate::finalizer::{finalize, InvocationOutput};
use crate::moderation::PendingModeration;
use crate::request::RequestDescriptor;
use crate::selector::{ResponseMode, StreamTarget};
use crate::stream::{StreamAdapter, StreamLaunch, TextStreamAdapter, TokenStream};
use crate::tool_loop::{ToolLoop, MAX_SEQUENTIAL_TOOL_EXECUTIONS};
use crate::transcript::Transcript;

const DEFAULT_STREAM_CAPACITY: usize = 128;

/// A configured service. Cheap to share behind an `Arc`; every invocation
/// is independent apart from the conversation memory it reads and appends.
pub struct AiService {
    chat_model: Arc<dyn ChatModel>,
    memory: Option<Arc<dyn ChatMemoryStore>>,
    tools: ToolSource,
    moderation_model: Option<Arc<dyn ModerationModel>>,
    augmentor: Option<Arc<dyn RetrievalAugmentor>>,
    system_message_provider: Option<SystemMessageProvider>,
    renderer: Arc<dyn TemplateRenderer>,
    output_parser: Arc<dyn OutputParser>,
    schema_deriver: Arc<dyn SchemaDeriver>,
    stream_adapters: Vec<Arc<dyn StreamAdapter>>,
    events: Arc<EventBus>,
    default_conversation_id: ConversationId,
    max_sequential_tool_executions: usize,
    stream_capacity: usize,
}

/// A request as it would be sent, without touching memory, retrieval or
/// the model.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedRequest {
    pub conversation_id: ConversationId,
    pub mode: &'static str,
    pub request: ChatRequest,
}

impl AiService {
    pub fn builder(chat_model: Arc<dyn ChatModel>) -> AiServiceBuilder {
        AiServiceBuilder::new(chat_model)
    }

    /// A builder preset from `config`: memory store and retention, default
    /// conversation, tool-loop ceiling, stream and event capacities.
    pub fn from_config(chat_model: Arc<dyn ChatModel>, config: &ServiceConfig) -> AiServiceBuilder {
        let mut builder = AiServiceBuilder::new(chat_model)
            .with_default_conversation_id(ConversationId(config.default_conversation_id.clone()))
            .with_max_sequential_tool_executions(config.max_sequential_tool_executions)
            .with_stream_capacity(config.streaming.channel_capacity)
            .with_event_bus(Arc::new(EventBus::new(config.events.capacity)));

        if config.memory.enabled {
            builder = builder.with_memory(Arc::new(InMemoryChatMemoryStore::with_retention(
                config.memory.retention(),
            )));
        }
        builder
    }

    pub fn memory_store(&self) -> Option<&Arc<dyn ChatMemoryStore>> {
        self.memory.as_ref()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn default_conversation_id(&self) -> &ConversationId {
        &self.default_conversation_id
    }

    /// Run one invocation.
    ///
    /// Configuration problems are reported before any model call and before
    /// memory is touched. Once memory has been appended to, a failure leaves
    /// whatever was appended in place.
    ///
    /// A returned [`TokenStream`] does not touch memory until it is started;
    /// it then holds the conversation log until its task finishes.
    pub async fn invoke(&self, request: RequestDescriptor) -> Result<InvocationOutput> {
        let conversation_id = request.conversation_or(&self.default_conversation_id);
        match self.run(request, &conversation_id).await {
            Ok(output) => Ok(output),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Invocation failed");
                publish_failure(&self.events, &conversation_id, &e);
                Err(e)
            }
        }
    }

    /// Assemble `request` into the model request it would produce, without
    /// memory history, retrieval, moderation or any model call.
    pub async fn render(&self, request: &RequestDescriptor) -> Result<RenderedRequest> {
        let conversation_id = request.conversation_or(&self.default_conversation_id);
        let (mode, AssembledRequest { system, user }) = self.prepare(request, &conversation_id)?;
        let user = self.with_format_instructions(&mode, &request.result_shape, user);
        let catalog = self.tools.resolve(&conversation_id, &user).await?;

        let messages = system.into_iter().map(ChatMessage::from).chain([ChatMessage::from(user)]).collect();
        Ok(RenderedRequest {
            conversation_id,
            mode: mode.label(),
            request: ChatRequest {
                messages,
                tools: catalog.specifications(),
                response_format: mode.response_format(),
            },
        })
    }

    async fn run(&self, request: RequestDescriptor, conversation_id: &ConversationId) -> Result<InvocationOutput> {
        let (mode, AssembledRequest { system, user }) = self.prepare(&request, conversation_id)?;

        let moderation_model = match (request.moderate, &self.moderation_model) {
            (false, _) => None,
            (true, Some(model)) => Some(model.clone()),
            (true, None) => {
                return Err(Error::config(
                    "Moderation was requested but no moderation model is configured",
                ));
            }
        };

        info!(
            conversation_id = %conversation_id,
            mode = mode.label(),
            memory = self.memory.is_some(),
            moderate = request.moderate,
            "Invocation started"
        );
        self.events.publish(DomainEvent::InvocationStarted {
            conversation_id: conversation_id.to_string(),
            streaming: mode.is_stream(),
            timestamp: Utc::now(),
        });

        // Held until the invocation finishes. A stream takes it when started.
        let log = match &self.memory {
            Some(store) if !mode.is_stream() => Some(store.acquire(conversation_id).await),
            _ => None,
        };

        let (user, sources) = match &self.augmentor {
            Some(augmentor) => {
                let history = match (&log, &self.memory) {
                    (Some(log), _) => Some(log.snapshot()),
                    (None, Some(store)) => Some(store.snapshot(conversation_id).await),
                    (None, None) => None,
                };
                let augmented = augment(augmentor.as_ref(), user, conversation_id, history).await?;
                (augmented.user, Some(augmented.sources))
            }
            None => (user, None),
        };
        let user = self.with_format_instructions(&mode, &request.result_shape, user);

        let catalog = self.tools.resolve(conversation_id, &user).await?;
        let opening: Vec<ChatMessage> = system
            .into_iter()
            .map(ChatMessage::from)
            .chain([ChatMessage::from(user)])
            .collect();

        let tool_loop = ToolLoop::new(
            self.chat_model.clone(),
            catalog,
            conversation_id.clone(),
            self.events.clone(),
        )
        .with_response_format(mode.response_format())
        .with_max_model_calls(self.max_sequential_tool_executions);

        if let ResponseMode::Stream(target) = mode {
            let stream = TokenStream::new(StreamLaunch {
                tool_loop,
                memory: self.memory.clone(),
                opening,
                moderation_model,
                sources,
                conversation_id: conversation_id.clone(),
                capacity: self.stream_capacity,
                events: self.events.clone(),
            });
            return Ok(match target {
                StreamTarget::Tokens => InvocationOutput::Stream(stream),
                StreamTarget::Adapted(adapter) => InvocationOutput::Adapted(adapter.adapt(stream)),
            });
        }

        let mut transcript = Transcript::open(log, opening);
        let moderation = moderation_model.map(|model| PendingModeration::launch(model, &transcript.messages()));

        let outcome = tool_loop.run(&mut transcript).await?;

        if let Some(pending) = moderation {
            pending.verify().await?;
        }

        let (model_calls, tool_executions, usage) = (outcome.model_calls, outcome.tool_executions.len(), outcome.usage);
        let output = finalize(self.output_parser.as_ref(), &request.result_shape, outcome, sources)?;
        publish_completion(&self.events, conversation_id, model_calls, tool_executions, usage);

        info!(
            conversation_id = %conversation_id,
            model_calls,
            tool_executions,
            output = output.kind(),
            "Invocation completed"
        );
        Ok(output)
    }

    /// Validate, pick the response mode, and assemble the messages.
    fn prepare(&self, request: &RequestDescriptor, conversation_id: &ConversationId) -> Result<(ResponseMode, AssembledRequest)> {
        let source = request.validate()?;
        let mode = ResponseMode::select(
            &request.result_shape,
            self.chat_model.as_ref(),
            self.schema_deriver.as_ref(),
            &self.stream_adapters,
        )?;
        let assembled = RequestAssembler::new(self.renderer.as_ref(), self.system_message_provider.as_ref())
            .assemble(request, source, conversation_id)?;
        debug!(conversation_id = %conversation_id, mode = mode.label(), "Request assembled");
        Ok((mode, assembled))
    }

    fn with_format_instructions(&self, mode: &ResponseMode, shape: &ResultShape, user: UserMessage) -> UserMessage {
        if !mode.wants_format_instructions() {
            return user;
        }
        let instructions = self.output_parser.format_instructions(shape);
        if instructions.trim().is_empty() {
            return user;
        }
        user.appended(Content::text(instructions))
    }
}

impl std::fmt::Debug for AiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiService")
            .field("chat_model", &self.chat_model.name())
            .field("memory", &self.memory.as_ref().map(|m| m.name().to_string()))
            .field("tools", &self.tools)
            .field("moderation", &self.moderation_model.is_some())
            .field("augmentation", &self.augmentor.is_some())
            .field("default_conversation_id", &self.default_conversation_id)
            .field("max_sequential_tool_executions", &self.max_sequential_tool_executions)
            .finish()
    }
}

pub(crate) fn publish_completion(
    events: &EventBus,
    conversation_id: &ConversationId,
    model_calls: usize,
    tool_executions: usize,
    usage: Option<TokenUsage>,
) {
    events.publish(DomainEvent::InvocationCompleted {
        conversation_id: conversation_id.to_string(),
        model_calls,
        tool_executions,
        total_tokens: usage.map(|u| u.total_tokens()).unwrap_or(0),
        timestamp: Utc::now(),
    });
}

pub(crate) fn publish_completed(events: &EventBus, conversation_id: &ConversationId, outcome: &crate::tool_loop::LoopOutcome) {
    publish_completion(
        events,
        conversation_id,
        outcome.model_calls,
        outcome.tool_executions.len(),
        outcome.usage,
    );
}

pub(crate) fn publish_failure(events: &EventBus, conversation_id: &ConversationId, error: &Error) {
    if let Error::ContentPolicy { flagged_text } = error {
        events.publish(DomainEvent::ModerationFlagged {
            conversation_id: conversation_id.to_string(),
            flagged_text: flagged_text.clone(),
            timestamp: Utc::now(),
        });
    }
    events.publish(DomainEvent::ErrorOccurred {
        context: format!("invoke:{conversation_id}"),
        error_message: error.to_string(),
        timestamp: Utc::now(),
    });
}

/// Builder for [`AiService`].
pub struct AiServiceBuilder {
    chat_model: Arc<dyn ChatModel>,
    memory: Option<Arc<dyn ChatMemoryStore>>,
    tools: ToolSource,
    moderation_model: Option<Arc<dyn ModerationModel>>,
    augmentor: Option<Arc<dyn RetrievalAugmentor>>,
    system_message_provider: Option<SystemMessageProvider>,
    renderer: Arc<dyn TemplateRenderer>,
    output_parser: Arc<dyn OutputParser>,
    schema_deriver: Arc<dyn SchemaDeriver>,
    stream_adapters: Vec<Arc<dyn StreamAdapter>>,
    events: Arc<EventBus>,
    default_conversation_id: ConversationId,
    max_sequential_tool_executions: usize,
    stream_capacity: usize,
}

impl AiServiceBuilder {
    /// A memory-less service with the built-in collaborators and the
    /// text-stream adapter.
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            chat_model,
            memory: None,
            tools: ToolSource::None,
            moderation_model: None,
            augmentor: None,
            system_message_provider: None,
            renderer: Arc::new(PromptTemplate),
            output_parser: Arc::new(DefaultOutputParser),
            schema_deriver: Arc::new(DefaultSchemaDeriver),
            stream_adapters: vec![Arc::new(TextStreamAdapter)],
            events: Arc::new(EventBus::default()),
            default_conversation_id: ConversationId::default(),
            max_sequential_tool_executions: MAX_SEQUENTIAL_TOOL_EXECUTIONS,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_memory(mut self, store: Arc<dyn ChatMemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn without_memory(mut self) -> Self {
        self.memory = None;
        self
    }

    /// The same tools for every invocation. Replaces any tool provider.
    pub fn with_tools(mut self, catalog: ToolCatalog) -> Self {
        self.tools = ToolSource::Static(catalog);
        self
    }

    /// Tools chosen per invocation. Replaces any static catalog.
    pub fn with_tool_provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.tools = ToolSource::Dynamic(provider);
        self
    }

    pub fn with_moderation_model(mut self, model: Arc<dyn ModerationModel>) -> Self {
        self.moderation_model = Some(model);
        self
    }

    pub fn with_retrieval_augmentor(mut self, augmentor: Arc<dyn RetrievalAugmentor>) -> Self {
        self.augmentor = Some(augmentor);
        self
    }

    /// System template per conversation, used when a call brings none.
    pub fn with_system_message_provider(
        mut self,
        provider: impl Fn(&ConversationId) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.system_message_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_template_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_output_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.output_parser = parser;
        self
    }

    pub fn with_schema_deriver(mut self, deriver: Arc<dyn SchemaDeriver>) -> Self {
        self.schema_deriver = deriver;
        self
    }

    pub fn with_stream_adapter(mut self, adapter: Arc<dyn StreamAdapter>) -> Self {
        self.stream_adapters.push(adapter);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_default_conversation_id(mut self, id: ConversationId) -> Self {
        self.default_conversation_id = id;
        self
    }

    pub fn with_max_sequential_tool_executions(mut self, max: usize) -> Self {
        self.max_sequential_tool_executions = max;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    pub fn build(self) -> AiService {
        AiService {
            chat_model: self.chat_model,
            memory: self.memory,
            tools: self.tools,
            moderation_model: self.moderation_model,
            augmentor: self.augmentor,
            system_message_provider: self.system_message_provider,
            renderer: self.renderer,
            output_parser: self.output_parser,
            schema_deriver: self.schema_deriver,
            stream_adapters: self.stream_adapters,
            events: self.events,
            default_conversation_id: self.default_conversation_id,
            max_sequential_tool_executions: self.max_sequential_tool_executions,
            stream_capacity: self.stream_capacity,
        }
    }
}
