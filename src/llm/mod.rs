pub mod openai;
pub mod provider;
pub mod sse;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::{CompletionStream, LlmProvider};
pub use types::{ChatMessage, ChatRequest, ModerationResult};
