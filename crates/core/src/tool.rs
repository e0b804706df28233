//! Tool specifications, executors, and the per-invocation tool catalog.
//!
//! A catalog maps each [`ToolSpecification`] (what the model is told about)
//! to the [`ToolExecutor`] that runs it. Catalogs are either configured once
//! or produced per conversation by a [`ToolProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, ToolError};
use crate::message::{ConversationId, ToolRequest, UserMessage};

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpecification {
    /// The tool name, unique within one catalog
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Runs one kind of tool invocation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `request` on behalf of conversation `conversation_id`.
    async fn execute(
        &self,
        request: &ToolRequest,
        conversation_id: &ConversationId,
    ) -> std::result::Result<String, ToolError>;
}

/// A self-describing tool.
///
/// Implementors carry their own specification and can be registered into a
/// catalog directly with [`ToolCatalog::register_tool`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "lookup").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn call(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError>;

    fn to_specification(&self) -> ToolSpecification {
        ToolSpecification {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct ToolAdapter(Arc<dyn Tool>);

#[async_trait]
impl ToolExecutor for ToolAdapter {
    async fn execute(
        &self,
        request: &ToolRequest,
        _conversation_id: &ConversationId,
    ) -> std::result::Result<String, ToolError> {
        let arguments: serde_json::Value = serde_json::from_str(&request.arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("{}: {e}", request.name)))?;
        self.0.call(arguments).await
    }
}

/// One completed tool execution, kept for the caller-visible trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub request: ToolRequest,
    pub result: String,
}

/// The tools available to one invocation, in registration order.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<(ToolSpecification, Arc<dyn ToolExecutor>)>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique within a catalog.
    pub fn register(
        &mut self,
        specification: ToolSpecification,
        executor: Arc<dyn ToolExecutor>,
    ) -> crate::Result<()> {
        if self.executor(&specification.name).is_some() {
            return Err(Error::config(format!(
                "Tool '{}' is registered more than once",
                specification.name
            )));
        }
        self.entries.push((specification, executor));
        Ok(())
    }

    /// Register a self-describing tool.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> crate::Result<()> {
        let specification = tool.to_specification();
        self.register(specification, Arc::new(ToolAdapter(tool)))
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        specification: ToolSpecification,
        executor: Arc<dyn ToolExecutor>,
    ) -> crate::Result<Self> {
        self.register(specification, executor)?;
        Ok(self)
    }

    /// Look up the executor for a tool name.
    pub fn executor(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.entries
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map(|(_, executor)| executor.clone())
    }

    /// All specifications (for sending to the LLM).
    pub fn specifications(&self) -> Vec<ToolSpecification> {
        self.entries.iter().map(|(spec, _)| spec.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(spec, _)| spec.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog").field("tools", &self.names()).finish()
    }
}

/// Input to a [`ToolProvider`].
#[derive(Debug, Clone)]
pub struct ToolProviderRequest {
    pub conversation_id: ConversationId,
    pub user_message: UserMessage,
}

/// Supplies the tool catalog dynamically, per conversation.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// `None` means no tools for this invocation.
    async fn provide_tools(&self, request: ToolProviderRequest) -> crate::Result<Option<ToolCatalog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn call(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    #[test]
    fn catalog_register_and_lookup() {
        let mut catalog = ToolCatalog::new();
        catalog.register_tool(Arc::new(EchoTool)).unwrap();
        assert!(catalog.executor("echo").is_some());
        assert!(catalog.executor("nonexistent").is_none());
        assert_eq!(catalog.specifications()[0].name, "echo");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut catalog = ToolCatalog::new();
        catalog.register_tool(Arc::new(EchoTool)).unwrap();
        let err = catalog.register_tool(Arc::new(EchoTool)).unwrap_err();
        assert!(err.is_config());
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn tool_adapter_parses_arguments() {
        let mut catalog = ToolCatalog::new();
        catalog.register_tool(Arc::new(EchoTool)).unwrap();
        let request = ToolRequest::new("call_1", "echo", r#"{"text":"hello world"}"#);
        let out = catalog
            .executor("echo")
            .unwrap()
            .execute(&request, &ConversationId::default())
            .await
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn tool_adapter_rejects_bad_json() {
        let mut catalog = ToolCatalog::new();
        catalog.register_tool(Arc::new(EchoTool)).unwrap();
        let request = ToolRequest::new("call_1", "echo", "{oops");
        let err = catalog
            .executor("echo")
            .unwrap()
            .execute(&request, &ConversationId::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
