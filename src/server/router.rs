use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::ServerSettings;
use crate::server::handlers::{health, search};
use crate::state::AppState;

/// Creates the application router.
///
/// Routes:
/// - `GET /health`
/// - `POST /api/vector-search` (any other method answers 405)
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.server);
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/vector-search",
            post(search::vector_search).fallback(search::method_not_allowed),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(server: &ServerSettings) -> CorsLayer {
    let allowed_origins = server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
