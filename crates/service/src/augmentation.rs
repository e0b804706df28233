//! Augmentation merge: hand the user text to retrieval and keep the
//! original media.

use aiservices_core::error::Result;
use aiservices_core::message::{ChatMessage, Content, ConversationId, UserMessage};
use aiservices_core::retrieval::{
    AugmentationMetadata, AugmentationRequest, RetrievalAugmentor, RetrievedContent,
};
use tracing::debug;

/// The user message after augmentation and the sources retrieval reported.
#[derive(Debug, Clone)]
pub struct Augmented {
    pub user: UserMessage,
    pub sources: Vec<RetrievedContent>,
}

/// Run `augmentor` over the text of `user`.
///
/// Retrieval only ever sees text, so media items of the original message
/// are appended, unchanged and in order, after the contents it returns.
/// Failures propagate.
pub async fn augment(
    augmentor: &dyn RetrievalAugmentor,
    user: UserMessage,
    conversation_id: &ConversationId,
    chat_history: Option<Vec<ChatMessage>>,
) -> Result<Augmented> {
    let media = user.media();
    let text_only = UserMessage {
        contents: vec![Content::text(user.text())],
        name: user.name.clone(),
    };

    let result = augmentor
        .augment(AugmentationRequest {
            user_message: text_only,
            metadata: AugmentationMetadata {
                conversation_id: conversation_id.clone(),
                chat_history,
            },
        })
        .await?;

    debug!(
        conversation_id = %conversation_id,
        sources = result.contents.len(),
        media = media.len(),
        "Augmented user message"
    );

    let mut merged = result.user_message;
    merged.contents.extend(media);
    if merged.name.is_none() {
        merged.name = user.name;
    }

    Ok(Augmented {
        user: merged,
        sources: result.contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedAugmentor;
    use aiservices_core::error::{Error, ProviderError};

    #[tokio::test]
    async fn media_is_reappended_after_new_text() {
        let augmentor = ScriptedAugmentor::new("question\n\nContext: lava is hot")
            .with_source(RetrievedContent::new("lava is hot"));
        let image = Content::image("https://example.com/volcano.png");
        let user = UserMessage::new(vec![Content::text("question"), image.clone()]).with_name("klaus");

        let out = augment(&augmentor, user, &ConversationId::default(), None).await.unwrap();

        assert_eq!(
            out.user.contents,
            vec![Content::text("question\n\nContext: lava is hot"), image]
        );
        assert_eq!(out.user.name.as_deref(), Some("klaus"));
        assert_eq!(out.sources.len(), 1);

        // Retrieval saw text only.
        let seen = augmentor.requests();
        assert_eq!(seen[0].user_message.contents, vec![Content::text("question")]);
        assert!(seen[0].metadata.chat_history.is_none());
    }

    #[tokio::test]
    async fn history_is_forwarded() {
        let augmentor = ScriptedAugmentor::new("x");
        let history = vec![ChatMessage::user("earlier")];
        augment(
            &augmentor,
            UserMessage::from_text("now"),
            &ConversationId::from("k"),
            Some(history.clone()),
        )
        .await
        .unwrap();

        let seen = augmentor.requests();
        assert_eq!(seen[0].metadata.conversation_id.as_str(), "k");
        assert_eq!(seen[0].metadata.chat_history, Some(history));
    }

    #[tokio::test]
    async fn failures_propagate() {
        let augmentor = ScriptedAugmentor::failing("index offline");
        let err = augment(&augmentor, UserMessage::from_text("q"), &ConversationId::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Retrieval(_))));
    }
}
