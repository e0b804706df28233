//! Output finalization: the parsed value, or the rich wrapper around it.

use aiservices_core::error::{Error, Result};
use aiservices_core::model::{FinishReason, TokenUsage};
use aiservices_core::output::{OutputParser, ResultShape};
use aiservices_core::retrieval::RetrievedContent;
use aiservices_core::tool::ToolExecution;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::stream::{AdaptedStream, TokenStream};
use crate::tool_loop::LoopOutcome;

/// Parsed content together with everything that went into producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichResult {
    pub content: serde_json::Value,

    /// Summed over every model call
    pub token_usage: Option<TokenUsage>,

    /// Retrieval sources; absent when no augmentor ran
    pub sources: Option<Vec<RetrievedContent>>,

    /// Finish reason of the last model call
    pub finish_reason: Option<FinishReason>,

    pub tool_executions: Vec<ToolExecution>,
}

impl RichResult {
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.content.clone())?)
    }
}

/// What `invoke` returns, according to the declared result shape.
#[derive(Debug)]
pub enum InvocationOutput {
    Value(serde_json::Value),
    Rich(RichResult),
    Stream(TokenStream),
    Adapted(AdaptedStream),
}

impl InvocationOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Rich(_) => "rich",
            Self::Stream(_) => "stream",
            Self::Adapted(_) => "adapted",
        }
    }

    pub fn into_value(self) -> Result<serde_json::Value> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(unexpected("a value", &other)),
        }
    }

    pub fn into_rich(self) -> Result<RichResult> {
        match self {
            Self::Rich(rich) => Ok(rich),
            other => Err(unexpected("a rich result", &other)),
        }
    }

    pub fn into_stream(self) -> Result<TokenStream> {
        match self {
            Self::Stream(stream) => Ok(stream),
            other => Err(unexpected("a token stream", &other)),
        }
    }

    /// The adapter's output, as the concrete type it built.
    pub fn into_adapted<T: 'static>(self) -> Result<T> {
        match self {
            Self::Adapted(adapted) => adapted
                .downcast::<T>()
                .map(|boxed| *boxed)
                .map_err(|_| Error::Internal("The adapted stream has a different type".into())),
            other => Err(unexpected("an adapted stream", &other)),
        }
    }

    /// Deserialize the parsed content (plain or rich) into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Value(value) => Ok(serde_json::from_value(value)?),
            Self::Rich(rich) => rich.deserialize(),
            other => Err(unexpected("parsed content", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &InvocationOutput) -> Error {
    Error::Internal(format!("Expected {wanted}, the invocation produced {}", got.kind()))
}

/// Parse the final response of `outcome` into `shape`.
pub fn finalize(
    parser: &dyn OutputParser,
    shape: &ResultShape,
    outcome: LoopOutcome,
    sources: Option<Vec<RetrievedContent>>,
) -> Result<InvocationOutput> {
    let content = parser.parse(&outcome.response, shape)?;

    if !shape.is_rich() {
        return Ok(InvocationOutput::Value(content));
    }

    Ok(InvocationOutput::Rich(RichResult {
        content,
        token_usage: outcome.usage,
        sources,
        finish_reason: outcome.response.finish_reason,
        tool_executions: outcome.tool_executions,
    }))
}
