//! # aiservices core
//!
//! Domain types, collaborator traits, and error definitions for the
//! aiservices invocation runtime. Chat models, tools, memory stores,
//! moderation and retrieval are all traits here; the service crate wires
//! them together and concrete backends plug in from outside.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod model;
pub mod moderation;
pub mod output;
pub mod retrieval;
pub mod template;
pub mod tool;

pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use memory::{ChatMemoryStore, ConversationGuard, ConversationLog, RetentionPolicy};
pub use message::{
    AssistantMessage, ChatMessage, Content, ConversationId, Role, SystemMessage, ToolRequest,
    ToolResultMessage, UserMessage, DEFAULT_CONVERSATION_ID,
};
pub use model::{
    Capability, ChatModel, ChatRequest, ChunkReceiver, FinishReason, JsonSchema, ModelResponse,
    ResponseFormat, StreamChunk, TokenUsage,
};
pub use moderation::{Moderation, ModerationModel};
pub use output::{DefaultOutputParser, DefaultSchemaDeriver, OutputParser, ResultShape, SchemaDeriver};
pub use retrieval::{
    AugmentationMetadata, AugmentationRequest, AugmentationResult, RetrievalAugmentor, RetrievedContent,
};
pub use template::{PromptTemplate, TemplateRenderer};
pub use tool::{
    Tool, ToolCatalog, ToolExecution, ToolExecutor, ToolProvider, ToolProviderRequest, ToolSpecification,
};
