//! Message and conversation identity domain types.
//!
//! These are the value objects that flow through an invocation:
//! request assembly produces a system and a user message, the model answers
//! with assistant messages, and every executed tool contributes a tool result.
//! Messages are immutable once created; "modifying" one builds a new value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity value used when a call supplies no explicit conversation.
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Unique identifier for a conversation memory stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// A fresh, random conversation identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The process-wide default identity, not a random one: memory-enabled calls
/// without an explicit identity all share this stream.
impl Default for ConversationId {
    fn default() -> Self {
        Self(DEFAULT_CONVERSATION_ID.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The language model
    Assistant,
    /// Tool execution result
    Tool,
}

/// One content item of a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    File {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: url.into(),
            mime_type: None,
        }
    }

    pub fn file(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::File {
            url: url.into(),
            mime_type: Some(mime_type.into()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Unique ID for this invocation (echoed back in the tool result)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Arguments parsed as JSON; malformed arguments yield `Value::Null`.
    pub fn arguments_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Ordered content items: text and media
    pub contents: Vec<Content>,

    /// Optional display name of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserMessage {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            name: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)])
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// All text items joined with newlines.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The non-text (media) items, in order.
    pub fn media(&self) -> Vec<Content> {
        self.contents.iter().filter(|c| !c.is_text()).cloned().collect()
    }

    /// A copy with one more content item appended.
    pub fn appended(&self, content: Content) -> Self {
        let mut contents = self.contents.clone();
        contents.push(content);
        Self {
            contents,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Text content, absent when the model only requested tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Tool invocations requested by the model (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantMessage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_requests: Vec::new(),
        }
    }

    pub fn from_tool_requests(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: None,
            tool_requests,
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    /// The tool request this result answers
    pub id: String,

    pub tool_name: String,

    pub text: String,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System(SystemMessage { text: text.into() })
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage::from_text(text))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage::from_text(text))
    }

    /// Build the result message answering `request`.
    pub fn tool_result(request: &ToolRequest, text: impl Into<String>) -> Self {
        Self::ToolResult(ToolResultMessage {
            id: request.id.clone(),
            tool_name: request.name.clone(),
            text: text.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System(_) => Role::System,
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::ToolResult(_) => Role::Tool,
        }
    }

    /// Tool plumbing: tool results and assistant turns that request tools.
    pub fn is_tool_traffic(&self) -> bool {
        match self {
            Self::ToolResult(_) => true,
            Self::Assistant(a) => a.has_tool_requests(),
            _ => false,
        }
    }

    /// Text view of the message, as a model would read it.
    pub fn text(&self) -> String {
        match self {
            Self::System(s) => s.text.clone(),
            Self::User(u) => u.text(),
            Self::Assistant(a) => a.text_or_empty().to_string(),
            Self::ToolResult(t) => t.text.clone(),
        }
    }
}

impl From<SystemMessage> for ChatMessage {
    fn from(m: SystemMessage) -> Self {
        Self::System(m)
    }
}

impl From<UserMessage> for ChatMessage {
    fn from(m: UserMessage) -> Self {
        Self::User(m)
    }
}

impl From<AssistantMessage> for ChatMessage {
    fn from(m: AssistantMessage) -> Self {
        Self::Assistant(m)
    }
}
