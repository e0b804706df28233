//! Invocation orchestration for aiservices.
//!
//! An [`AiService`] turns a [`RequestDescriptor`] into a model conversation:
//!
//! 1. **Assemble** system and user messages from templates and variables
//! 2. **Augment** the user message with retrieved content, when configured
//! 3. **Choose** a response mode: token stream, JSON schema, or plain text
//!    with format instructions
//! 4. **Loop**: call the model, execute requested tools, feed results back,
//!    until the model answers without tool requests
//! 5. **Finalize** the answer into the declared result shape, after any
//!    moderation verdict has cleared
//!
//! With memory enabled, each conversation's log is locked for the whole
//! invocation, so concurrent calls on one conversation run one at a time.
//! A token stream takes the lock when it is started, not when it is returned.

pub mod assembly;
pub mod augmentation;
pub mod catalog;
pub mod finalizer;
pub mod moderation;
pub mod request;
pub mod scripted;
pub mod selector;
pub mod service;
pub mod stream;
pub mod stream_event;
pub mod tool_loop;
pub mod transcript;

pub use assembly::SystemMessageProvider;
pub use catalog::ToolSource;
pub use finalizer::{InvocationOutput, RichResult};
pub use request::{RequestDescriptor, RequestDescriptorBuilder};
pub use selector::ResponseMode;
pub use service::{AiService, AiServiceBuilder, RenderedRequest};
pub use stream::{AdaptedStream, CollectedStream, StreamAdapter, TextStream, TextStreamAdapter, TokenStream, TEXT_STREAM};
pub use stream_event::{StreamErrorKind, StreamEvent};
pub use tool_loop::{LoopOutcome, MAX_SEQUENTIAL_TOOL_EXECUTIONS};
