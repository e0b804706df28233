//! In-memory store: one lock-guarded log per conversation, kept for the
//! lifetime of the process.

use aiservices_core::memory::{ChatMemoryStore, ConversationGuard, ConversationLog, RetentionPolicy};
use aiservices_core::message::{ChatMessage, ConversationId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type SharedLog = Arc<Mutex<ConversationLog>>;

/// Keeps every conversation log in a map.
///
/// Each log sits behind its own mutex, so invocations on different
/// conversations never wait on each other while writers to the same
/// conversation are serialised.
pub struct InMemoryChatMemoryStore {
    logs: RwLock<HashMap<ConversationId, SharedLog>>,
    retention: RetentionPolicy,
}

impl InMemoryChatMemoryStore {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::Unbounded)
    }

    /// New logs are created with `retention`.
    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    async fn log_for(&self, id: &ConversationId) -> SharedLog {
        if let Some(log) = self.logs.read().await.get(id) {
            return log.clone();
        }

        let mut logs = self.logs.write().await;
        logs.entry(id.clone())
            .or_insert_with(|| {
                debug!(conversation_id = %id, "Creating conversation log");
                Arc::new(Mutex::new(ConversationLog::new(id.clone(), self.retention)))
            })
            .clone()
    }
}

impl Default for InMemoryChatMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMemoryStore for InMemoryChatMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn acquire(&self, id: &ConversationId) -> ConversationGuard {
        self.log_for(id).await.lock_owned().await
    }

    async fn snapshot(&self, id: &ConversationId) -> Vec<ChatMessage> {
        let log = self.logs.read().await.get(id).cloned();
        match log {
            Some(log) => log.lock().await.snapshot(),
            None => Vec::new(),
        }
    }

    async fn conversation_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<ConversationId> = self.logs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn remove(&self, id: &ConversationId) -> bool {
        self.logs.write().await.remove(id).is_some()
    }
}
