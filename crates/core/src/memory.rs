//! Conversation memory: an ordered, append-only message log per conversation.
//!
//! The [`ChatMemoryStore`] trait hands out exclusive access to one
//! conversation's [`ConversationLog`] at a time, so two invocations against
//! the same identity can never interleave their appends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::message::{ChatMessage, ConversationId};

/// How many messages a log keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep everything.
    #[default]
    Unbounded,
    /// Keep at most `max_messages` and one system message, evicting the
    /// oldest non-system messages.
    MessageWindow { max_messages: usize },
}

/// The message history of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    id: ConversationId,
    messages: Vec<ChatMessage>,
    retention: RetentionPolicy,
}

impl ConversationLog {
    pub fn new(id: ConversationId, retention: RetentionPolicy) -> Self {
        Self {
            id,
            messages: Vec::new(),
            retention,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Append a message, then apply the retention policy.
    ///
    /// Under a message window the log holds at most one system message: an
    /// identical one is not appended again, a different one replaces it.
    pub fn add(&mut self, message: ChatMessage) {
        if matches!(self.retention, RetentionPolicy::MessageWindow { .. })
            && matches!(message, ChatMessage::System(_))
        {
            if self.messages.contains(&message) {
                return;
            }
            self.messages.retain(|m| !matches!(m, ChatMessage::System(_)));
        }
        self.messages.push(message);
        self.enforce_retention();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// An owned copy of the current history.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn enforce_retention(&mut self) {
        let RetentionPolicy::MessageWindow { max_messages } = self.retention else {
            return;
        };

        while self.messages.len() > max_messages {
            let Some(oldest) = self.oldest_evictable() else {
                // The window stays over capacity until the next append.
                break;
            };

            let evicted = self.messages.remove(oldest);

            // Tool results answering an evicted request go with it.
            if let ChatMessage::Assistant(assistant) = &evicted {
                let answered: Vec<&str> = assistant.tool_requests.iter().map(|r| r.id.as_str()).collect();
                self.messages.retain(|m| match m {
                    ChatMessage::ToolResult(result) => !answered.contains(&result.id.as_str()),
                    _ => true,
                });
            }
        }
    }

    /// The oldest non-system message that may go. The latest message is
    /// never evicted, nor is the assistant turn whose tool request it answers.
    /// Tool results are only evicted along with their request.
    fn oldest_evictable(&self) -> Option<usize> {
        let (latest, earlier) = self.messages.split_last()?;
        let pending_request = match latest {
            ChatMessage::ToolResult(result) => Some(result.id.as_str()),
            _ => None,
        };

        let requested = |id: &str| {
            earlier.iter().any(|m| match m {
                ChatMessage::Assistant(assistant) => assistant.tool_requests.iter().any(|r| r.id == id),
                _ => false,
            })
        };

        earlier.iter().position(|m| match m {
            ChatMessage::System(_) => false,
            ChatMessage::Assistant(assistant) => pending_request
                .is_none_or(|id| !assistant.tool_requests.iter().any(|r| r.id == id)),
            // Results leave together with their request.
            ChatMessage::ToolResult(result) => !requested(&result.id),
            ChatMessage::User(_) => true,
        })
    }
}

/// Exclusive, writer-serialised access to one conversation log.
pub type ConversationGuard = OwnedMutexGuard<ConversationLog>;

/// The core ChatMemoryStore trait.
///
/// Implementations create logs lazily on first reference to an identity.
#[async_trait]
pub trait ChatMemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Wait for exclusive access to the log of `id`, creating it if needed.
    ///
    /// The guard must be held for the whole invocation; dropping it lets the
    /// next writer in.
    async fn acquire(&self, id: &ConversationId) -> ConversationGuard;

    /// A copy of the current history of `id` (empty if unknown).
    async fn snapshot(&self, id: &ConversationId) -> Vec<ChatMessage>;

    /// Identities with a log.
    async fn conversation_ids(&self) -> Vec<ConversationId>;

    /// Drop the log of `id`. Returns whether one existed.
    async fn remove(&self, id: &ConversationId) -> bool;
}
