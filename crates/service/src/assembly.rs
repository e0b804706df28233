//! Request assembly: the (system?, user) message pair of one invocation.

use aiservices_core::error::{Error, Result};
use aiservices_core::message::{Content, ConversationId, SystemMessage, UserMessage};
use aiservices_core::template::{PromptTemplate, TemplateRenderer};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::request::{RequestDescriptor, UserSource};

/// Supplies a system message template per conversation.
pub type SystemMessageProvider = Arc<dyn Fn(&ConversationId) -> Option<String> + Send + Sync>;

/// Name of the placeholder bound to a lone unnamed argument.
const IT: &str = "it";

/// The assembled messages of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRequest {
    pub system: Option<SystemMessage>,
    pub user: UserMessage,
}

/// Builds the system and user messages from a validated descriptor.
pub struct RequestAssembler<'a> {
    renderer: &'a dyn TemplateRenderer,
    system_provider: Option<&'a SystemMessageProvider>,
}

impl<'a> RequestAssembler<'a> {
    pub fn new(renderer: &'a dyn TemplateRenderer, system_provider: Option<&'a SystemMessageProvider>) -> Self {
        Self {
            renderer,
            system_provider,
        }
    }

    pub fn assemble(
        &self,
        descriptor: &RequestDescriptor,
        source: UserSource,
        conversation_id: &ConversationId,
    ) -> Result<AssembledRequest> {
        let variables: BTreeMap<String, String> = descriptor.variables.iter().cloned().collect();

        let (user, it_candidates) = match source {
            UserSource::Explicit(message) => (message, Vec::new()),
            UserSource::Template {
                text,
                remaining_arguments,
            } => {
                let bindings = bind_it(&text, &variables, &remaining_arguments)?;
                let rendered = self.renderer.render(&text, &bindings)?;

                let mut contents = vec![Content::text(rendered)];
                contents.extend(descriptor.media.iter().cloned());
                let mut user = UserMessage::new(contents);
                user.name = descriptor.user_name.clone();
                (user, remaining_arguments)
            }
        };

        let system = match &descriptor.system_message {
            Some(message) => Some(message.clone()),
            None => {
                let template = descriptor
                    .system_template
                    .clone()
                    .or_else(|| self.system_provider.and_then(|provider| (**provider)(conversation_id)));
                match template {
                    Some(template) => {
                        let bindings = bind_it(&template, &variables, &it_candidates)?;
                        Some(SystemMessage {
                            text: self.renderer.render(&template, &bindings)?,
                        })
                    }
                    None => None,
                }
            }
        };

        Ok(AssembledRequest { system, user })
    }
}

/// Bind `{{it}}` to the single unnamed argument when the template needs it
/// and no variable of that name exists.
fn bind_it(
    template: &str,
    variables: &BTreeMap<String, String>,
    unnamed: &[String],
) -> Result<BTreeMap<String, String>> {
    let needs_it = PromptTemplate::variables(template).iter().any(|v| v == IT);
    if !needs_it || variables.contains_key(IT) {
        return Ok(variables.clone());
    }

    match unnamed {
        [only] => {
            let mut bound = variables.clone();
            bound.insert(IT.to_string(), only.clone());
            Ok(bound)
        }
        [] => Err(Error::config(
            "Cannot find the value of the template variable 'it': no unnamed argument",
        )),
        many => Err(Error::config(format!(
            "Cannot find the value of the template variable 'it': {} unnamed arguments are ambiguous",
            many.len()
        ))),
    }
}
