use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, ModerationResult};
use crate::core::errors::UpstreamError;

/// Receiving half of a streamed completion. Dropping it stops the relay.
pub type CompletionStream = mpsc::Receiver<Result<String, UpstreamError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// classify text against the provider's content policy
    async fn moderate(&self, input: &str) -> Result<ModerationResult, UpstreamError>;

    /// embed a single input
    async fn embed(&self, input: &str, model_id: &str) -> Result<Vec<f32>, UpstreamError>;

    /// chat completion (streaming); fails before returning if the
    /// provider rejects the request
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<CompletionStream, UpstreamError>;
}
