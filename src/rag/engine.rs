//! Retrieval-augmented answer pipeline.
//!
//! `RagEngine::answer` runs one request end to end:
//! 1. Validate the `prompt` field
//! 2. Moderate the query
//! 3. Embed the query
//! 4. Match page sections in the vector store
//! 5. Assemble the context under the token budget
//! 6. Build the prompt and open a streamed completion
//!
//! Steps run strictly in sequence and the first failure aborts the request.
//! Nothing is cached between requests.

use std::sync::Arc;

use serde_json::{json, Value};

use super::context_builder::build_context;
use super::prompt::generate_prompt;
use super::store::{MatchParams, PageSection, SectionStore};
use super::tokenizer::TokenCounter;
use crate::core::config::SearchSettings;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, CompletionStream, LlmProvider};

pub const INVALID_QUERY_MESSAGE: &str = "Invalid query: must be a non-empty string";

pub struct RagEngine {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn SectionStore>,
    tokenizer: Arc<dyn TokenCounter>,
    settings: SearchSettings,
}

impl RagEngine {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn SectionStore>,
        tokenizer: Arc<dyn TokenCounter>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            llm,
            store,
            tokenizer,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Runs the pipeline for a request body and returns the open
    /// completion stream. No byte of the answer has been produced when an
    /// error is returned.
    pub async fn answer(&self, payload: &Value) -> Result<CompletionStream, ApiError> {
        let query = sanitize_query(payload)?;

        self.moderate(&query).await?;
        let embedding = self.embed(&query).await?;
        let sections = self.match_sections(embedding).await?;

        let context = build_context(
            &sections,
            self.tokenizer.as_ref(),
            self.settings.context_token_budget,
        )
        .map_err(ApiError::unexpected)?;
        tracing::info!(
            matched = sections.len(),
            included = context.included,
            tokens = context.tokens,
            "Assembled context"
        );

        let prompt = generate_prompt(&context.text, &query);
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        self.llm
            .stream_chat(request, &self.settings.chat_model)
            .await
            .map_err(|e| ApiError::application("Failed to generate completion", e))
    }

    async fn moderate(&self, query: &str) -> Result<(), ApiError> {
        let result = self
            .llm
            .moderate(query)
            .await
            .map_err(|e| ApiError::application("Failed to moderate content", e))?;

        if result.flagged {
            tracing::info!("Query rejected by moderation");
            return Err(ApiError::user_with_data(
                "Flagged content",
                json!({
                    "flagged": true,
                    "categories": result.categories,
                }),
            ));
        }
        Ok(())
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let input = query.replace('\n', " ");
        let embedding = self
            .llm
            .embed(&input, &self.settings.embedding_model)
            .await
            .map_err(|e| ApiError::application("Failed to create embedding for question", e))?;
        tracing::debug!(dimensions = embedding.len(), "Created query embedding");
        Ok(embedding)
    }

    async fn match_sections(&self, embedding: Vec<f32>) -> Result<Vec<PageSection>, ApiError> {
        let params = MatchParams::from(&self.settings);
        self.store
            .match_page_sections(&embedding, &params)
            .await
            .map_err(|e| ApiError::application("Failed to match page sections", e))
    }
}

/// Extracts and trims the `prompt` field. Anything other than a string with
/// non-whitespace content is rejected.
pub fn sanitize_query(payload: &Value) -> Result<String, ApiError> {
    let query = payload
        .get("prompt")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::user(INVALID_QUERY_MESSAGE))?;
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::UpstreamError;
    use crate::rag::prompt::PREAMBLE;
    use crate::rag::tokenizer::EstimatedTokenCounter;
    use crate::test_support::{section, FakeLlm, FakeStore};
    use std::sync::atomic::Ordering;

    fn engine(llm: Arc<FakeLlm>, store: Arc<FakeStore>) -> RagEngine {
        RagEngine::new(
            llm,
            store,
            Arc::new(EstimatedTokenCounter),
            SearchSettings::default(),
        )
    }

    async fn collect(mut stream: CompletionStream) -> String {
        let mut out = String::new();
        while let Some(chunk) = stream.recv().await {
            out.push_str(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn sanitize_query_trims_and_rejects_blank() {
        assert_eq!(
            sanitize_query(&json!({ "prompt": "  what is RLS?\n" })).unwrap(),
            "what is RLS?"
        );
        for payload in [
            json!({ "prompt": "" }),
            json!({ "prompt": "   " }),
            json!({ "prompt": 42 }),
            json!({ "prompt": null }),
            json!({}),
            json!("prompt"),
        ] {
            let err = sanitize_query(&payload).unwrap_err();
            assert!(matches!(err, ApiError::User { ref message, .. } if message == INVALID_QUERY_MESSAGE));
        }
    }

    #[tokio::test]
    async fn answers_with_ranked_sections_in_prompt() {
        let llm = Arc::new(FakeLlm::with_chunks(&["An embedding ", "is a vector."]));
        let store = Arc::new(FakeStore::with_sections(vec![
            section("Embeddings are vectors of floats."),
            section("pgvector stores embeddings in Postgres."),
            section("Similarity is measured with cosine distance."),
        ]));
        let engine = engine(llm.clone(), store.clone());

        let stream = engine
            .answer(&json!({ "prompt": "what is an embedding?" }))
            .await
            .unwrap();
        assert_eq!(collect(stream).await, "An embedding is a vector.");

        let (request, model) = llm.last_chat().unwrap();
        assert_eq!(model, "gpt-4-mini");
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");

        let prompt = &request.messages[0].content;
        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains("Embeddings are vectors of floats.\n---\n"));
        assert!(prompt.contains("pgvector stores embeddings in Postgres."));
        assert!(prompt.contains("Similarity is measured with cosine distance."));
        assert!(prompt.contains("Question: \"\"\"\nwhat is an embedding?\n\"\"\""));

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.last_params().unwrap(), MatchParams {
            match_threshold: 0.78,
            match_count: 10,
            min_content_length: 50,
        });
        assert_eq!(store.last_embedding_len.load(Ordering::SeqCst), 1536);
    }

    #[tokio::test]
    async fn embedding_input_has_newlines_replaced() {
        let llm = Arc::new(FakeLlm::with_chunks(&["ok"]));
        let engine = engine(llm.clone(), Arc::new(FakeStore::default()));

        engine
            .answer(&json!({ "prompt": "line one\nline two" }))
            .await
            .unwrap();

        assert_eq!(llm.last_embed_input().unwrap(), "line one line two");
        assert_eq!(llm.last_moderation_input().unwrap(), "line one\nline two");
    }

    #[tokio::test]
    async fn flagged_query_stops_before_embedding() {
        let llm = Arc::new(FakeLlm::flagged());
        let store = Arc::new(FakeStore::default());
        let engine = engine(llm.clone(), store.clone());

        let err = engine
            .answer(&json!({ "prompt": "something awful" }))
            .await
            .unwrap_err();

        match err {
            ApiError::User { message, data } => {
                assert_eq!(message, "Flagged content");
                let data = data.unwrap();
                assert_eq!(data["flagged"], json!(true));
                assert_eq!(data["categories"]["violence"], json!(true));
            }
            other => panic!("expected user error, got {:?}", other),
        }
        assert_eq!(llm.embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.chat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedding_failure_is_application_error() {
        let llm = Arc::new(FakeLlm {
            embed_error: Some(UpstreamError::Status {
                status: 429,
                body: json!({ "error": "rate limited" }),
            }),
            ..FakeLlm::default()
        });
        let store = Arc::new(FakeStore::default());
        let engine = engine(llm.clone(), store.clone());

        let err = engine.answer(&json!({ "prompt": "hi" })).await.unwrap_err();

        match err {
            ApiError::Application { message, data } => {
                assert_eq!(message, "Failed to create embedding for question");
                assert_eq!(data["status"], json!(429));
            }
            other => panic!("expected application error, got {:?}", other),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_failure_is_application_error() {
        let llm = Arc::new(FakeLlm::with_chunks(&["unused"]));
        let store = Arc::new(FakeStore {
            error: Some(UpstreamError::Transport("connection refused".to_string())),
            ..FakeStore::default()
        });
        let engine = engine(llm.clone(), store);

        let err = engine.answer(&json!({ "prompt": "hi" })).await.unwrap_err();

        assert!(matches!(err, ApiError::Application { ref message, .. } if message == "Failed to match page sections"));
        assert_eq!(llm.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completion_rejection_is_application_error() {
        let llm = Arc::new(FakeLlm {
            chat_error: Some(UpstreamError::Status {
                status: 404,
                body: json!({ "error": { "message": "model not found" } }),
            }),
            ..FakeLlm::default()
        });
        let engine = engine(llm, Arc::new(FakeStore::default()));

        let err = engine.answer(&json!({ "prompt": "hi" })).await.unwrap_err();

        assert!(matches!(err, ApiError::Application { ref message, .. } if message == "Failed to generate completion"));
    }

    #[tokio::test]
    async fn moderation_failure_is_application_error() {
        let llm = Arc::new(FakeLlm {
            moderation_error: Some(UpstreamError::Decode("no results".to_string())),
            ..FakeLlm::default()
        });
        let engine = engine(llm.clone(), Arc::new(FakeStore::default()));

        let err = engine.answer(&json!({ "prompt": "hi" })).await.unwrap_err();

        assert!(matches!(err, ApiError::Application { ref message, .. } if message == "Failed to moderate content"));
        assert_eq!(llm.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_query_calls_no_collaborator() {
        let llm = Arc::new(FakeLlm::default());
        let store = Arc::new(FakeStore::default());
        let engine = engine(llm.clone(), store.clone());

        let err = engine.answer(&json!({ "prompt": "   " })).await.unwrap_err();

        assert!(matches!(err, ApiError::User { .. }));
        assert_eq!(llm.total_calls(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
