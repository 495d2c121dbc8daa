// Conversation layer
//
// Provider abstraction plus the bounded tool-call loop.

pub mod openai;
pub mod provider;
pub mod service;

pub use openai::OpenAiProvider;
pub use provider::{ChatMessage, ChatProvider, ProviderRequest, ProviderResponse, ToolCallRequest, Usage};
pub use service::{ChatReply, ChatService, ChatTurn, ToolCallRecord, SYSTEM_PROMPT};
