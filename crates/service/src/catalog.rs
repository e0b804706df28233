//! Tool catalog resolution: which tools one invocation may call.

use aiservices_core::error::Result;
use aiservices_core::message::{ConversationId, UserMessage};
use aiservices_core::tool::{ToolCatalog, ToolProvider, ToolProviderRequest};
use std::sync::Arc;
use tracing::debug;

/// Where an invocation's tools come from.
#[derive(Clone, Default)]
pub enum ToolSource {
    #[default]
    None,
    /// The same catalog for every invocation
    Static(ToolCatalog),
    /// A catalog supplied per invocation
    Dynamic(Arc<dyn ToolProvider>),
}

impl ToolSource {
    /// The catalog for one invocation; possibly empty.
    pub async fn resolve(&self, conversation_id: &ConversationId, user_message: &UserMessage) -> Result<ToolCatalog> {
        let catalog = match self {
            Self::None => ToolCatalog::new(),
            Self::Static(catalog) => catalog.clone(),
            Self::Dynamic(provider) => provider
                .provide_tools(ToolProviderRequest {
                    conversation_id: conversation_id.clone(),
                    user_message: user_message.clone(),
                })
                .await?
                .unwrap_or_default(),
        };

        debug!(conversation_id = %conversation_id, tools = ?catalog.names(), "Resolved tool catalog");
        Ok(catalog)
    }
}

impl std::fmt::Debug for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "ToolSource::None"),
            Self::Static(catalog) => f.debug_tuple("ToolSource::Static").field(catalog).finish(),
            Self::Dynamic(_) => write!(f, "ToolSource::Dynamic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedToolExecutor;
    use aiservices_core::tool::ToolSpecification;
    use async_trait::async_trait;

    fn spec(name: &str) -> ToolSpecification {
        ToolSpecification {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    struct PerConversation;

    #[async_trait]
    impl ToolProvider for PerConversation {
        async fn provide_tools(&self, request: ToolProviderRequest) -> Result<Option<ToolCatalog>> {
            if request.conversation_id.as_str() != "admin" {
                return Ok(None);
            }
            let catalog = ToolCatalog::new().with(spec("shutdown"), Arc::new(ScriptedToolExecutor::new("ok")))?;
            Ok(Some(catalog))
        }
    }

    #[tokio::test]
    async fn none_is_empty() {
        let catalog = ToolSource::None
            .resolve(&ConversationId::default(), &UserMessage::from_text("hi"))
            .await
            .unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn static_catalog_is_returned() {
        let catalog = ToolCatalog::new()
            .with(spec("lookup"), Arc::new(ScriptedToolExecutor::new("42")))
            .unwrap();
        let resolved = ToolSource::Static(catalog)
            .resolve(&ConversationId::default(), &UserMessage::from_text("hi"))
            .await
            .unwrap();
        assert_eq!(resolved.names(), vec!["lookup"]);
    }

    #[tokio::test]
    async fn dynamic_provider_decides_per_conversation() {
        let source = ToolSource::Dynamic(Arc::new(PerConversation));
        let user = UserMessage::from_text("hi");

        let admin = source.resolve(&ConversationId::from("admin"), &user).await.unwrap();
        assert_eq!(admin.names(), vec!["shutdown"]);

        let guest = source.resolve(&ConversationId::from("guest"), &user).await.unwrap();
        assert!(guest.is_empty());
    }
}
