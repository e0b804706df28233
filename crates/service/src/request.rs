//! The request descriptor: everything one invocation needs to know about
//! its inputs, built explicitly by the caller and validated before any
//! model call.

use aiservices_core::error::{Error, Result};
use aiservices_core::message::{Content, ConversationId, SystemMessage, UserMessage};
use aiservices_core::output::ResultShape;

/// Inputs of one invocation.
///
/// Prefer [`RequestDescriptor::builder`]; fields are public so adapter
/// layers can fill them directly.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Memory stream to use; the service default when absent
    pub conversation_id: Option<ConversationId>,

    /// Used verbatim when present
    pub system_message: Option<SystemMessage>,

    pub system_template: Option<String>,

    /// Used verbatim when present; excludes every other user content source
    pub user_message: Option<UserMessage>,

    /// Template declared for the call
    pub user_template: Option<String>,

    /// Template passed in as an argument value
    pub user_template_argument: Option<String>,

    /// Named bindings in binding order; a later binding of a name wins
    pub variables: Vec<(String, String)>,

    /// Values passed without a variable name
    pub arguments: Vec<String>,

    /// Non-text items appended after the rendered user text
    pub media: Vec<Content>,

    /// Display name attached to the user message
    pub user_name: Option<String>,

    /// Run the moderation gate for this call
    pub moderate: bool,

    pub result_shape: ResultShape,
}

/// Where the user message comes from, once validation has settled it.
#[derive(Debug, Clone, PartialEq)]
pub enum UserSource {
    Explicit(UserMessage),
    Template {
        text: String,
        /// Unnamed arguments not consumed as the template itself
        remaining_arguments: Vec<String>,
    },
}

impl RequestDescriptor {
    pub fn builder() -> RequestDescriptorBuilder {
        RequestDescriptorBuilder::default()
    }

    /// Check the descriptor for ambiguous or missing inputs and decide the
    /// user message source.
    pub fn validate(&self) -> Result<UserSource> {
        if let Some(message) = &self.user_message {
            let conflicting = [
                (self.user_template.is_some(), "a user template"),
                (self.user_template_argument.is_some(), "a user template argument"),
                (!self.arguments.is_empty(), "unnamed arguments"),
                (!self.media.is_empty(), "media content"),
                (self.user_name.is_some(), "a user name"),
            ];
            if let Some((_, what)) = conflicting.iter().find(|(present, _)| *present) {
                return Err(Error::config(format!(
                    "An explicit user message cannot be combined with {what}"
                )));
            }
            return Ok(UserSource::Explicit(message.clone()));
        }

        let template = match (&self.user_template, &self.user_template_argument) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "The user template is defined both on the call and as an argument",
                ));
            }
            (Some(t), None) | (None, Some(t)) => Some(t.clone()),
            (None, None) => None,
        };

        if let Some(text) = template {
            ensure_not_blank(&text, "user")?;
            return Ok(UserSource::Template {
                text,
                remaining_arguments: self.arguments.clone(),
            });
        }

        // The first unnamed argument becomes the template itself.
        match self.arguments.split_first() {
            Some((first, rest)) => {
                ensure_not_blank(first, "user")?;
                Ok(UserSource::Template {
                    text: first.clone(),
                    remaining_arguments: rest.to_vec(),
                })
            }
            None => Err(Error::config("The request does not have a user message defined")),
        }
    }

    /// The conversation this call runs against.
    pub fn conversation_or(&self, default: &ConversationId) -> ConversationId {
        self.conversation_id.clone().unwrap_or_else(|| default.clone())
    }
}

fn ensure_not_blank(template: &str, kind: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(Error::config(format!("The {kind} template is empty")));
    }
    Ok(())
}

/// Consuming builder for [`RequestDescriptor`].
#[derive(Debug, Clone)]
pub struct RequestDescriptorBuilder {
    inner: RequestDescriptor,
}

impl Default for RequestDescriptorBuilder {
    fn default() -> Self {
        Self {
            inner: RequestDescriptor {
                conversation_id: None,
                system_message: None,
                system_template: None,
                user_message: None,
                user_template: None,
                user_template_argument: None,
                variables: Vec::new(),
                arguments: Vec::new(),
                media: Vec::new(),
                user_name: None,
                moderate: false,
                result_shape: ResultShape::Text,
            },
        }
    }
}

impl RequestDescriptorBuilder {
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.inner.conversation_id = Some(ConversationId(id.into()));
        self
    }

    pub fn system_message(mut self, text: impl Into<String>) -> Self {
        self.inner.system_message = Some(SystemMessage { text: text.into() });
        self
    }

    pub fn system_template(mut self, template: impl Into<String>) -> Self {
        self.inner.system_template = Some(template.into());
        self
    }

    pub fn user_message(mut self, message: UserMessage) -> Self {
        self.inner.user_message = Some(message);
        self
    }

    pub fn user_template(mut self, template: impl Into<String>) -> Self {
        self.inner.user_template = Some(template.into());
        self
    }

    pub fn user_template_argument(mut self, template: impl Into<String>) -> Self {
        self.inner.user_template_argument = Some(template.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.variables.push((name.into(), value.into()));
        self
    }

    pub fn argument(mut self, value: impl Into<String>) -> Self {
        self.inner.arguments.push(value.into());
        self
    }

    pub fn media(mut self, content: Content) -> Self {
        self.inner.media.push(content);
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.inner.user_name = Some(name.into());
        self
    }

    pub fn moderate(mut self, moderate: bool) -> Self {
        self.inner.moderate = moderate;
        self
    }

    pub fn returning(mut self, shape: ResultShape) -> Self {
        self.inner.result_shape = shape;
        self
    }

    pub fn build(self) -> RequestDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_template_is_used() {
        let source = RequestDescriptor::builder()
            .user_template("Tell me about {{topic}}")
            .variable("topic", "volcanoes")
            .build()
            .validate()
            .unwrap();
        assert_eq!(
            source,
            UserSource::Template {
                text: "Tell me about {{topic}}".into(),
                remaining_arguments: vec![],
            }
        );
    }

    #[test]
    fn explicit_user_message_is_exclusive() {
        let base = RequestDescriptor::builder().user_message(UserMessage::from_text("hi"));

        assert!(base.clone().build().validate().is_ok());
        assert!(base.clone().variable("a", "b").build().validate().is_ok());

        for conflicting in [
            base.clone().user_template("t"),
            base.clone().user_template_argument("t"),
            base.clone().argument("x"),
            base.clone().media(Content::image("https://example.com/a.png")),
            base.clone().user_name("klaus"),
        ] {
            let err = conflicting.build().validate().unwrap_err();
            assert!(err.is_config(), "{err}");
        }
    }

    #[test]
    fn two_template_sources_conflict() {
        let err = RequestDescriptor::builder()
            .user_template("a")
            .user_template_argument("b")
            .build()
            .validate()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn blank_template_rejected() {
        let err = RequestDescriptor::builder()
            .user_template("   ")
            .build()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn first_argument_becomes_template() {
        let source = RequestDescriptor::builder()
            .argument("What is {{it}}?")
            .argument("rust")
            .build()
            .validate()
            .unwrap();
        assert_eq!(
            source,
            UserSource::Template {
                text: "What is {{it}}?".into(),
                remaining_arguments: vec!["rust".into()],
            }
        );
    }

    #[test]
    fn no_user_content_is_config_error() {
        let err = RequestDescriptor::builder()
            .system_message("rules")
            .build()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("does not have a user message defined"));
    }

    #[test]
    fn conversation_falls_back_to_default() {
        let default = ConversationId::default();
        let anonymous = RequestDescriptor::builder().argument("x").build();
        assert_eq!(anonymous.conversation_or(&default), default);

        let named = RequestDescriptor::builder().conversation_id("k").argument("x").build();
        assert_eq!(named.conversation_or(&default).as_str(), "k");
    }
}
