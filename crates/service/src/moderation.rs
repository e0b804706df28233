//! The moderation gate: a concurrent safety check whose verdict is only
//! consulted once generation has finished.

use aiservices_core::error::{Error, ProviderError, Result};
use aiservices_core::message::ChatMessage;
use aiservices_core::moderation::{Moderation, ModerationModel};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A launched moderation check.
///
/// Dropping it without calling [`verify`](Self::verify) detaches the task:
/// it runs to completion on the runtime and its verdict is discarded.
#[derive(Debug)]
pub struct PendingModeration {
    handle: JoinHandle<std::result::Result<Moderation, ProviderError>>,
}

impl PendingModeration {
    /// Start checking `messages` on the runtime's worker pool.
    ///
    /// Tool results and assistant turns that request tools are not
    /// moderated.
    pub fn launch(model: Arc<dyn ModerationModel>, messages: &[ChatMessage]) -> Self {
        let moderated: Vec<ChatMessage> = messages.iter().filter(|m| !m.is_tool_traffic()).cloned().collect();
        debug!(moderator = model.name(), messages = moderated.len(), "Launching moderation");

        let handle = tokio::spawn(async move { model.moderate(&moderated).await });
        Self { handle }
    }

    /// Wait for the verdict; a flagged verdict is a content-policy error.
    pub async fn verify(self) -> Result<()> {
        let verdict = self
            .handle
            .await
            .map_err(|e| Error::Internal(format!("Moderation task failed: {e}")))??;

        if verdict.flagged {
            let flagged_text = verdict.flagged_text.unwrap_or_default();
            warn!(flagged_text = %flagged_text, "Moderation flagged the conversation");
            return Err(Error::ContentPolicy { flagged_text });
        }
        Ok(())
    }
}
