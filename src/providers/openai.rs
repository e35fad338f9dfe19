pub mod client;
pub mod types;

pub use client::OpenAIProvider;
pub use types::{
    ChatPayload, CompletionChunk, CompletionRequest, CompletionResult, EnhancementResult, Message,
    Usage,
};
