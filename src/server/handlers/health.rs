use std::sync::Arc;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = state.engine.settings();
    Json(json!({
        "status": "ok",
        "chat_model": settings.chat_model,
        "embedding_model": settings.embedding_model
    }))
}
