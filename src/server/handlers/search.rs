use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::errors::ApiError;
use crate::llm::CompletionStream;
use crate::state::AppState;

/// `POST /api/vector-search`: answers `{ "prompt": "..." }` with a plain-text
/// stream of the generated answer.
pub async fn vector_search(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::user(format!("Invalid request body: {}", e)))?;

    let stream = AssertUnwindSafe(state.engine.answer(&payload))
        .catch_unwind()
        .await
        .map_err(|panic| ApiError::Unknown(panic_message(panic.as_ref())))??;

    Ok(streaming_response(stream))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Relays completion chunks as they arrive. When the client goes away the
/// body, and with it the receiver, is dropped, which stops the upstream relay.
fn streaming_response(stream: CompletionStream) -> Response {
    let chunks = ReceiverStream::new(stream).map(|chunk| {
        chunk.map_err(|e| {
            tracing::error!("Completion stream failed: {}", e.diagnostic());
            std::io::Error::other(e.to_string())
        })
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(chunks),
    )
        .into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
