//! Subcommand implementations and the request flags they share.

pub mod config_cmd;
pub mod render;
pub mod replay;

use aiservices_config::{ConfigError, ServiceConfig};
use aiservices_core::message::Content;
use aiservices_core::output::ResultShape;
use aiservices_service::{RequestDescriptor, TEXT_STREAM};
use std::path::{Path, PathBuf};

/// Load `path`, or the default location, with environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = ServiceConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => ServiceConfig::load(),
    }
}

/// Flags describing one request.
#[derive(Debug, Clone, clap::Args)]
pub struct RequestArgs {
    /// Conversation identity
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// System message, used verbatim
    #[arg(long, conflicts_with = "system_template")]
    pub system: Option<String>,

    /// System message template
    #[arg(long)]
    pub system_template: Option<String>,

    /// User message template
    #[arg(short, long)]
    pub user: Option<String>,

    /// Template variable as NAME=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_variable)]
    pub variables: Vec<(String, String)>,

    /// Image URL appended to the user message (repeatable)
    #[arg(long = "image")]
    pub images: Vec<String>,

    /// Display name of the user
    #[arg(long)]
    pub name: Option<String>,

    /// Run the moderation gate
    #[arg(long)]
    pub moderate: bool,

    /// text, boolean, integer, number, lines, json[:NAME], enum:A,B,C,
    /// stream, text_stream or adapted:TARGET
    #[arg(long, default_value = "text", value_parser = parse_shape)]
    pub returns: ResultShape,

    /// JSON schema file for a json result
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Wrap the result with usage, sources and the tool trace
    #[arg(long)]
    pub rich: bool,

    /// Unnamed values; the first is the user template when --user is absent
    pub arguments: Vec<String>,
}

impl RequestArgs {
    pub fn to_descriptor(&self) -> Result<RequestDescriptor, Box<dyn std::error::Error>> {
        let mut shape = self.returns.clone();
        if let Some(path) = &self.schema {
            let schema: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            match &mut shape {
                ResultShape::Json { schema: slot, .. } => *slot = Some(schema),
                _ => return Err("--schema only applies to a json result".into()),
            }
        }
        if self.rich {
            shape = ResultShape::rich(shape);
        }

        let mut builder = RequestDescriptor::builder()
            .moderate(self.moderate)
            .returning(shape);

        if let Some(id) = &self.conversation {
            builder = builder.conversation_id(id);
        }
        if let Some(text) = &self.system {
            builder = builder.system_message(text);
        }
        if let Some(template) = &self.system_template {
            builder = builder.system_template(template);
        }
        if let Some(template) = &self.user {
            builder = builder.user_template(template);
        }
        if let Some(name) = &self.name {
            builder = builder.user_name(name);
        }
        for (name, value) in &self.variables {
            builder = builder.variable(name, value);
        }
        for value in &self.arguments {
            builder = builder.argument(value);
        }
        for url in &self.images {
            builder = builder.media(Content::image(url));
        }

        Ok(builder.build())
    }
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

fn parse_shape(raw: &str) -> Result<ResultShape, String> {
    let (kind, detail) = match raw.split_once(':') {
        Some((kind, detail)) => (kind, Some(detail)),
        None => (raw, None),
    };

    let shape = match (kind, detail) {
        ("text", None) => ResultShape::Text,
        ("boolean", None) => ResultShape::Boolean,
        ("integer", None) => ResultShape::Integer,
        ("number", None) => ResultShape::Number,
        ("lines", None) => ResultShape::Lines,
        ("json", name) => ResultShape::Json {
            name: name.unwrap_or("Result").to_string(),
            schema: None,
        },
        ("enum", Some(variants)) => {
            let variants: Vec<String> = variants
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if variants.is_empty() {
                return Err("enum needs at least one variant, e.g. enum:YES,NO".into());
            }
            ResultShape::Enum {
                name: "Choice".into(),
                variants,
            }
        }
        ("stream", None) => ResultShape::TokenStream,
        ("text_stream", None) => ResultShape::Adapted {
            target: TEXT_STREAM.into(),
        },
        ("adapted", Some(target)) if !target.is_empty() => ResultShape::Adapted {
            target: target.to_string(),
        },
        _ => return Err(format!("unknown result shape '{raw}'")),
    };
    Ok(shape)
}
