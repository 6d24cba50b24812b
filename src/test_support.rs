//! In-memory collaborators for pipeline and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::core::errors::UpstreamError;
use crate::llm::{ChatRequest, CompletionStream, LlmProvider, ModerationResult};
use crate::rag::{MatchParams, PageSection, SectionStore};

pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn section(content: &str) -> PageSection {
    PageSection {
        id: None,
        page_id: None,
        content: content.to_string(),
        similarity: 0.85,
    }
}

#[derive(Default)]
pub struct FakeLlm {
    pub flagged_categories: Option<Map<String, Value>>,
    pub moderation_error: Option<UpstreamError>,
    pub embed_error: Option<UpstreamError>,
    pub chat_error: Option<UpstreamError>,
    pub chunks: Vec<String>,
    /// Sent after all chunks, simulating a connection reset mid-answer.
    pub stream_error: Option<UpstreamError>,
    pub moderate_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub moderation_input: Mutex<Option<String>>,
    pub embed_input: Mutex<Option<String>>,
    pub chat: Mutex<Option<(ChatRequest, String)>>,
}

impl FakeLlm {
    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn flagged() -> Self {
        let mut categories = Map::new();
        categories.insert("violence".to_string(), json!(true));
        categories.insert("hate".to_string(), json!(false));
        Self {
            flagged_categories: Some(categories),
            ..Self::default()
        }
    }

    pub fn total_calls(&self) -> usize {
        self.moderate_calls.load(Ordering::SeqCst)
            + self.embed_calls.load(Ordering::SeqCst)
            + self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn last_moderation_input(&self) -> Option<String> {
        self.moderation_input.lock().unwrap().clone()
    }

    pub fn last_embed_input(&self) -> Option<String> {
        self.embed_input.lock().unwrap().clone()
    }

    pub fn last_chat(&self) -> Option<(ChatRequest, String)> {
        self.chat.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn moderate(&self, input: &str) -> Result<ModerationResult, UpstreamError> {
        self.moderate_calls.fetch_add(1, Ordering::SeqCst);
        *self.moderation_input.lock().unwrap() = Some(input.to_string());
        if let Some(err) = &self.moderation_error {
            return Err(err.clone());
        }
        Ok(match &self.flagged_categories {
            Some(categories) => ModerationResult {
                flagged: true,
                categories: categories.clone(),
            },
            None => ModerationResult::default(),
        })
    }

    async fn embed(&self, input: &str, _model_id: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        *self.embed_input.lock().unwrap() = Some(input.to_string());
        if let Some(err) = &self.embed_error {
            return Err(err.clone());
        }
        Ok(vec![0.01; EMBEDDING_DIMENSIONS])
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<CompletionStream, UpstreamError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.chat.lock().unwrap() = Some((request, model_id.to_string()));
        if let Some(err) = &self.chat_error {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(self.chunks.len() + 1);
        for chunk in &self.chunks {
            let _ = tx.try_send(Ok(chunk.clone()));
        }
        if let Some(err) = &self.stream_error {
            let _ = tx.try_send(Err(err.clone()));
        }
        Ok(rx)
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub sections: Vec<PageSection>,
    pub error: Option<UpstreamError>,
    pub panic_on_match: bool,
    pub calls: AtomicUsize,
    pub last_embedding_len: AtomicUsize,
    pub params: Mutex<Option<MatchParams>>,
}

impl FakeStore {
    pub fn with_sections(sections: Vec<PageSection>) -> Self {
        Self {
            sections,
            ..Self::default()
        }
    }

    pub fn last_params(&self) -> Option<MatchParams> {
        *self.params.lock().unwrap()
    }
}

#[async_trait]
impl SectionStore for FakeStore {
    async fn match_page_sections(
        &self,
        embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<PageSection>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_embedding_len
            .store(embedding.len(), Ordering::SeqCst);
        *self.params.lock().unwrap() = Some(*params);
        if self.panic_on_match {
            panic!("vector store client bug");
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.sections.clone())
    }
}
