//! Conversation memory store implementations for aiservices.

pub mod in_memory;

pub use in_memory::InMemoryChatMemoryStore;
