//! Where an invocation's messages accumulate: the conversation log when
//! memory is enabled, a local list otherwise.

use aiservices_core::memory::ConversationGuard;
use aiservices_core::message::ChatMessage;

pub enum Transcript {
    /// Exclusive access to the conversation log, held until the invocation ends
    Memory(ConversationGuard),
    Local(Vec<ChatMessage>),
}

impl Transcript {
    /// Begin with the invocation's opening messages, appended to the
    /// conversation log when there is one.
    pub fn open(log: Option<ConversationGuard>, opening: Vec<ChatMessage>) -> Self {
        match log {
            Some(mut log) => {
                for message in opening {
                    log.add(message);
                }
                Self::Memory(log)
            }
            None => Self::Local(opening),
        }
    }

    pub fn push(&mut self, message: impl Into<ChatMessage>) {
        match self {
            Self::Memory(log) => log.add(message.into()),
            Self::Local(messages) => messages.push(message.into()),
        }
    }

    /// The message set for the next model call: the whole log, or the
    /// local list.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self {
            Self::Memory(log) => log.snapshot(),
            Self::Local(messages) => messages.clone(),
        }
    }

    pub fn uses_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(log) => write!(f, "Transcript::Memory({}, {} messages)", log.id(), log.len()),
            Self::Local(messages) => write!(f, "Transcript::Local({} messages)", messages.len()),
        }
    }
}
