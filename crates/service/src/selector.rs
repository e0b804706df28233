//! Response selection: stream, schema-constrained, or plain.

use aiservices_core::error::{Error, Result};
use aiservices_core::model::{Capability, ChatModel, JsonSchema, ResponseFormat};
use aiservices_core::output::{ResultShape, SchemaDeriver};
use std::sync::Arc;

use crate::stream::StreamAdapter;

/// What a stream-mode invocation hands back.
#[derive(Clone)]
pub enum StreamTarget {
    /// The token stream itself
    Tokens,
    /// The token stream converted by an adapter
    Adapted(Arc<dyn StreamAdapter>),
}

/// How one invocation produces its answer; chosen once, before any model call.
#[derive(Clone)]
pub enum ResponseMode {
    Stream(StreamTarget),
    /// Every model call carries this schema as its response format
    Structured(JsonSchema),
    Plain,
}

impl ResponseMode {
    pub fn select(
        shape: &ResultShape,
        model: &dyn ChatModel,
        deriver: &dyn SchemaDeriver,
        adapters: &[Arc<dyn StreamAdapter>],
    ) -> Result<Self> {
        if shape.is_rich() && shape.content_shape().is_stream_like() {
            return Err(Error::config("A rich result cannot wrap a stream"));
        }

        if *shape == ResultShape::TokenStream {
            return Ok(Self::Stream(StreamTarget::Tokens));
        }

        let mut matching = adapters.iter().filter(|a| a.can_adapt(shape));
        match (matching.next(), matching.next()) {
            (Some(adapter), None) => return Ok(Self::Stream(StreamTarget::Adapted(adapter.clone()))),
            (Some(_), Some(_)) => {
                return Err(Error::config(format!(
                    "More than one stream adapter can produce {shape:?}"
                )));
            }
            (None, _) => {
                if let ResultShape::Adapted { target } = shape {
                    return Err(Error::config(format!(
                        "No stream adapter can produce '{target}'"
                    )));
                }
            }
        }

        if model.supports(Capability::JsonSchemaResponseFormat)
            && let Some(schema) = deriver.schema_for(shape)
        {
            return Ok(Self::Structured(schema));
        }

        Ok(Self::Plain)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Only plain calls get format instructions appended to the user message.
    pub fn wants_format_instructions(&self) -> bool {
        matches!(self, Self::Plain)
    }

    pub fn response_format(&self) -> Option<ResponseFormat> {
        match self {
            Self::Structured(schema) => Some(ResponseFormat::Json { schema: schema.clone() }),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stream(StreamTarget::Tokens) => "stream",
            Self::Stream(StreamTarget::Adapted(_)) => "adapted_stream",
            Self::Structured(_) => "structured",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Debug for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
