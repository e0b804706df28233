//! ModerationModel trait: content safety checks over a message set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ChatMessage;

/// The verdict of a moderation check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderation {
    pub flagged: bool,

    /// The offending text, when flagged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged_text: Option<String>,
}

impl Moderation {
    pub fn flagged(text: impl Into<String>) -> Self {
        Self {
            flagged: true,
            flagged_text: Some(text.into()),
        }
    }

    pub fn not_flagged() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait ModerationModel: Send + Sync {
    fn name(&self) -> &str;

    async fn moderate(&self, messages: &[ChatMessage]) -> std::result::Result<Moderation, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_constructors() {
        let bad = Moderation::flagged("kill");
        assert!(bad.flagged);
        assert_eq!(bad.flagged_text.as_deref(), Some("kill"));

        let ok = Moderation::not_flagged();
        assert!(!ok.flagged);
        assert!(ok.flagged_text.is_none());
    }
}
