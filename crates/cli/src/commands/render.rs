//! `aiservices render` — Show the request an invocation would send.

use aiservices_config::ServiceConfig;
use aiservices_core::model::Capability;
use aiservices_service::scripted::ScriptedChatModel;
use aiservices_service::{AiService, RenderedRequest};
use std::path::Path;
use std::sync::Arc;

use super::{RequestArgs, load_config};

#[derive(Debug, Clone, clap::Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Render for a model that accepts JSON schema response formats
    #[arg(long)]
    pub schema_capable: bool,
}

pub async fn run(config_path: Option<&Path>, args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let rendered = render(&config, &args).await?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// Nothing is sent: the model behind the service has no responses.
pub async fn render(config: &ServiceConfig, args: &RenderArgs) -> Result<RenderedRequest, Box<dyn std::error::Error>> {
    let mut model = ScriptedChatModel::new(Vec::new());
    if args.schema_capable {
        model = model.with_capability(Capability::JsonSchemaResponseFormat);
    }

    let service = AiService::from_config(Arc::new(model), config).build();
    let descriptor = args.request.to_descriptor()?;
    Ok(service.render(&descriptor).await?)
}
