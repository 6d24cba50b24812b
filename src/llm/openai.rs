use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::provider::{CompletionStream, LlmProvider};
use super::sse::{SseDecoder, SseEvent};
use super::types::{ChatRequest, ModerationResult};
use crate::core::errors::UpstreamError;

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// OpenAI REST client covering moderation, embeddings and streamed chat.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn moderate(&self, input: &str) -> Result<ModerationResult, UpstreamError> {
        let res = self
            .client
            .post(self.url("moderations"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": input }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(UpstreamError::from_response(res).await);
        }

        let payload: ModerationResponse = res.json().await?;
        payload
            .results
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Decode("moderation response had no results".to_string()))
    }

    async fn embed(&self, input: &str, model_id: &str) -> Result<Vec<f32>, UpstreamError> {
        let res = self
            .client
            .post(self.url("embeddings"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model_id, "input": input }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(UpstreamError::from_response(res).await);
        }

        let payload: EmbeddingResponse = res.json().await?;
        payload
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| UpstreamError::Decode("embedding response had no data".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<CompletionStream, UpstreamError> {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let res = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(UpstreamError::from_response(res).await);
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(relay(res.bytes_stream(), tx));

        Ok(rx)
    }
}

/// Decodes an SSE byte stream into deltas until `[DONE]`, an error, or the
/// receiver hanging up. The upstream stream is dropped on return.
async fn relay<S, B, E>(stream: S, tx: mpsc::Sender<Result<String, UpstreamError>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<UpstreamError>,
{
    futures_util::pin_mut!(stream);
    let mut decoder = SseDecoder::new();

    loop {
        let item = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("Completion receiver dropped, releasing upstream");
                return;
            }
            item = stream.next() => item,
        };
        let Some(item) = item else {
            break;
        };
        let events = match item {
            Ok(bytes) => decoder.push(bytes.as_ref()),
            Err(e) => Err(e.into()),
        };
        if !forward(&tx, events).await || decoder.is_done() {
            return;
        }
    }
    forward(&tx, decoder.finish()).await;
}

/// Sends decoded deltas downstream. Returns `false` when the relay should
/// stop, either because the receiver hung up or the upstream failed.
async fn forward(
    tx: &mpsc::Sender<Result<String, UpstreamError>>,
    events: Result<Vec<SseEvent>, UpstreamError>,
) -> bool {
    match events {
        Ok(events) => {
            for event in events {
                match event {
                    SseEvent::Delta(text) => {
                        if tx.send(Ok(text)).await.is_err() {
                            tracing::debug!("Completion receiver dropped, stopping relay");
                            return false;
                        }
                    }
                    SseEvent::Done => return false,
                }
            }
            true
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
