//! `aiservices replay` — Run an invocation against scripted collaborators.
//!
//! The script is a JSON file:
//!
//! ```json
//! {
//!   "responses": [
//!     { "message": { "tool_requests": [{ "id": "c1", "name": "lookup", "arguments": "{\"id\":7}" }] } },
//!     { "message": { "text": "answer=42" }, "usage": { "input_tokens": 9, "output_tokens": 3 } }
//!   ],
//!   "tools": { "lookup": { "description": "Look up a record", "result": "42" } },
//!   "moderation": { "flagged_text": null },
//!   "retrieval": { "text": "Context: ...", "sources": ["doc 1"] },
//!   "capabilities": ["json_schema_response_format"]
//! }
//! ```

use aiservices_config::ServiceConfig;
use aiservices_core::error::Error;
use aiservices_core::event::DomainEvent;
use aiservices_core::model::{Capability, ModelResponse};
use aiservices_core::retrieval::RetrievedContent;
use aiservices_core::tool::{ToolCatalog, ToolExecutor, ToolSpecification};
use aiservices_service::scripted::{ScriptedAugmentor, ScriptedChatModel, ScriptedModeration, ScriptedToolExecutor};
use aiservices_service::{AiService, InvocationOutput, StreamEvent, TextStream, TokenStream};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{RequestArgs, load_config};

#[derive(Debug, Clone, clap::Args)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Script with model responses and collaborator behavior
    #[arg(long)]
    pub script: PathBuf,

    /// Print domain events to stderr as JSON lines
    #[arg(long)]
    pub events: bool,
}

/// Scripted collaborators for one replay.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Model answers, in call order
    pub responses: Vec<ModelResponse>,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    #[serde(default)]
    pub tools: BTreeMap<String, ScriptTool>,

    /// Present to make a moderation model available
    #[serde(default)]
    pub moderation: Option<ScriptModeration>,

    #[serde(default)]
    pub retrieval: Option<ScriptRetrieval>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptTool {
    #[serde(default)]
    pub description: String,

    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,

    /// Returned on every call, or the failure reason when `fails` is set
    pub result: String,

    #[serde(default)]
    pub fails: bool,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptModeration {
    /// Flag the conversation with this text; absent means clean
    #[serde(default)]
    pub flagged_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptRetrieval {
    /// Replacement user text
    pub text: String,

    #[serde(default)]
    pub sources: Vec<String>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read script {}: {e}", path.display()))?;
        let script = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse script {}: {e}", path.display()))?;
        Ok(script)
    }

    /// A service configured by `config`, wired to this script.
    pub fn into_service(self, config: &ServiceConfig) -> aiservices_core::Result<AiService> {
        let model = self
            .capabilities
            .into_iter()
            .fold(ScriptedChatModel::new(self.responses), ScriptedChatModel::with_capability);

        let mut builder = AiService::from_config(Arc::new(model), config);

        if !self.tools.is_empty() {
            let mut catalog = ToolCatalog::new();
            for (name, tool) in self.tools {
                let executor: Arc<dyn ToolExecutor> = if tool.fails {
                    Arc::new(ScriptedToolExecutor::failing(tool.result))
                } else {
                    Arc::new(ScriptedToolExecutor::new(tool.result))
                };
                catalog.register(
                    ToolSpecification {
                        name,
                        description: tool.description,
                        parameters: tool.parameters,
                    },
                    executor,
                )?;
            }
            builder = builder.with_tools(catalog);
        }

        if let Some(moderation) = self.moderation {
            let model = match moderation.flagged_text {
                Some(text) => ScriptedModeration::flagging(text),
                None => ScriptedModeration::clean(),
            };
            builder = builder.with_moderation_model(Arc::new(model));
        }

        if let Some(retrieval) = self.retrieval {
            let augmentor = retrieval
                .sources
                .into_iter()
                .map(RetrievedContent::new)
                .fold(ScriptedAugmentor::new(retrieval.text), ScriptedAugmentor::with_source);
            builder = builder.with_retrieval_augmentor(Arc::new(augmentor));
        }

        Ok(builder.build())
    }
}

pub async fn run(config_path: Option<&Path>, args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let service = Script::load(&args.script)?.into_service(&config)?;
    let descriptor = args.request.to_descriptor()?;

    let printer = args.events.then(|| print_events(service.event_bus().subscribe()));

    let result = match service.invoke(descriptor).await {
        Ok(output) => print_output(output).await,
        Err(e) => Err(e.into()),
    };

    // Closes the event bus once any stream task has finished with it.
    drop(service);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    result
}

async fn print_output(output: InvocationOutput) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        InvocationOutput::Value(serde_json::Value::String(text)) => println!("{text}"),
        InvocationOutput::Value(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        InvocationOutput::Rich(rich) => println!("{}", serde_json::to_string_pretty(&rich)?),
        InvocationOutput::Stream(stream) => print_stream(stream).await?,
        adapted @ InvocationOutput::Adapted(_) => {
            let mut text: TextStream = adapted.into_adapted()?;
            while let Some(chunk) = text.next().await {
                print!("{}", chunk?);
                std::io::stdout().flush()?;
            }
            println!();
        }
    }
    Ok(())
}

async fn print_stream(stream: TokenStream) -> Result<(), Box<dyn std::error::Error>> {
    let mut rx = stream.start();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            StreamEvent::ToolCall { name, input, .. } => eprintln!("  [tool] {name}({input})"),
            StreamEvent::ToolResult { name, output, .. } => eprintln!("  [tool] {name} -> {output}"),
            StreamEvent::Done {
                usage,
                model_calls,
                tool_executions,
                ..
            } => {
                println!();
                eprintln!(
                    "  [done] {model_calls} model call(s), {tool_executions} tool execution(s), {} token(s)",
                    usage.map(|u| u.total_tokens()).unwrap_or(0)
                );
            }
            failed @ StreamEvent::Error { .. } => {
                println!();
                let error = failed
                    .into_error()
                    .unwrap_or_else(|| Error::Internal("stream failed".into()));
                return Err(error.into());
            }
        }
    }
    Ok(())
}

fn print_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(event.as_ref()) {
                    Ok(line) => eprintln!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Unprintable event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
