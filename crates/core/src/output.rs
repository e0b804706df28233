//! Declared result shapes and the collaborators that serve them.
//!
//! A [`ResultShape`] describes what the caller expects back from an
//! invocation. The [`OutputParser`] turns final model text into a value of
//! that shape and can describe the expected format to the model; the
//! [`SchemaDeriver`] produces a JSON schema when the shape has one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{JsonSchema, ModelResponse};

/// What the caller declared as the result of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultShape {
    /// Free text.
    Text,
    Boolean,
    Integer,
    Number,
    /// One of a closed set of names.
    Enum { name: String, variants: Vec<String> },
    /// A list of strings, one per line.
    Lines,
    /// A JSON document, optionally described by a schema.
    Json {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<serde_json::Value>,
    },
    /// A live token stream.
    TokenStream,
    /// A target built from a token stream by a registered adapter.
    Adapted { target: String },
    /// The parsed content plus usage, sources, finish reason and tool trace.
    Rich { content: Box<ResultShape> },
}

impl ResultShape {
    /// Wrap `content` in a rich result.
    pub fn rich(content: ResultShape) -> Self {
        Self::Rich {
            content: Box::new(content),
        }
    }

    pub fn json(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::Json {
            name: name.into(),
            schema: Some(schema),
        }
    }

    pub fn is_rich(&self) -> bool {
        matches!(self, Self::Rich { .. })
    }

    /// The shape of the parsed content (unwraps a rich result).
    pub fn content_shape(&self) -> &ResultShape {
        match self {
            Self::Rich { content } => content.content_shape(),
            other => other,
        }
    }

    /// Whether the shape can only be produced from a stream.
    pub fn is_stream_like(&self) -> bool {
        matches!(self, Self::TokenStream | Self::Adapted { .. })
    }
}

/// Converts final model output into the declared shape.
pub trait OutputParser: Send + Sync {
    /// Instructions appended to the user message so the model answers in a
    /// parseable format. Empty when no instruction is needed.
    fn format_instructions(&self, shape: &ResultShape) -> String;

    fn parse(&self, response: &ModelResponse, shape: &ResultShape) -> Result<serde_json::Value>;
}

/// Derives a JSON schema for schema-constrained output.
pub trait SchemaDeriver: Send + Sync {
    /// `None` when the shape has no schema representation.
    fn schema_for(&self, shape: &ResultShape) -> Option<JsonSchema>;
}

/// Parser for the built-in shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOutputParser;

impl OutputParser for DefaultOutputParser {
    fn format_instructions(&self, shape: &ResultShape) -> String {
        match shape.content_shape() {
            ResultShape::Text | ResultShape::TokenStream | ResultShape::Adapted { .. } => String::new(),
            ResultShape::Boolean => "\nYou must answer strictly in the following format: one of [true, false]".into(),
            ResultShape::Integer => "\nYou must answer strictly in the following format: integer number".into(),
            ResultShape::Number => "\nYou must answer strictly in the following format: numeric value".into(),
            ResultShape::Enum { variants, .. } => format!(
                "\nYou must answer strictly with one of these values:\n{}",
                variants.join("\n")
            ),
            ResultShape::Lines => "\nYou must put every item on a separate line.".into(),
            ResultShape::Json {
                schema: Some(schema),
                ..
            } => format!(
                "\nYou must answer strictly in the following JSON format: {}",
                serde_json::to_string_pretty(schema).unwrap_or_default()
            ),
            ResultShape::Json { schema: None, .. } => "\nYou must answer strictly with a valid JSON document.".into(),
            ResultShape::Rich { content } => self.format_instructions(content),
        }
    }

    fn parse(&self, response: &ModelResponse, shape: &ResultShape) -> Result<serde_json::Value> {
        let text = response.message.text_or_empty();
        let trimmed = text.trim();

        match shape.content_shape() {
            ResultShape::Text => Ok(serde_json::Value::String(text.to_string())),
            ResultShape::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(true.into()),
                "false" => Ok(false.into()),
                _ => Err(Error::OutputParsing(format!("'{trimmed}' is not a boolean"))),
            },
            ResultShape::Integer => trimmed
                .parse::<i64>()
                .map(Into::into)
                .map_err(|e| Error::OutputParsing(format!("'{trimmed}' is not an integer: {e}"))),
            ResultShape::Number => {
                let n = trimmed
                    .parse::<f64>()
                    .map_err(|e| Error::OutputParsing(format!("'{trimmed}' is not a number: {e}")))?;
                serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| Error::OutputParsing(format!("'{trimmed}' is not a finite number")))
            }
            ResultShape::Enum { name, variants } => {
                let candidate = trimmed.trim_matches('"');
                variants
                    .iter()
                    .find(|v| v.eq_ignore_ascii_case(candidate))
                    .map(|v| serde_json::Value::String(v.clone()))
                    .ok_or_else(|| Error::OutputParsing(format!("'{candidate}' is not a variant of {name}")))
            }
            ResultShape::Lines => Ok(serde_json::Value::Array(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|l| serde_json::Value::String(l.to_string()))
                    .collect(),
            )),
            ResultShape::Json { name, .. } => serde_json::from_str(strip_code_fence(trimmed))
                .map_err(|e| Error::OutputParsing(format!("answer is not a valid {name} JSON document: {e}"))),
            ResultShape::TokenStream | ResultShape::Adapted { .. } => Err(Error::OutputParsing(
                "stream shapes are not produced by parsing".into(),
            )),
            ResultShape::Rich { content } => self.parse(response, content),
        }
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Schema deriver for the built-in shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSchemaDeriver;

impl SchemaDeriver for DefaultSchemaDeriver {
    fn schema_for(&self, shape: &ResultShape) -> Option<JsonSchema> {
        match shape.content_shape() {
            ResultShape::Json {
                name,
                schema: Some(schema),
            } => Some(JsonSchema {
                name: name.clone(),
                schema: schema.clone(),
            }),
            ResultShape::Enum { name, variants } => Some(JsonSchema {
                name: name.clone(),
                schema: serde_json::json!({ "type": "string", "enum": variants }),
            }),
            _ => None,
        }
    }
}
