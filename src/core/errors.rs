use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

pub const APPLICATION_ERROR_MESSAGE: &str = "There was an error processing your request";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Failure surfaced by the search endpoint.
///
/// `User` errors are caused by the caller and carry data meant for them.
/// Every other variant is sanitized before it leaves the process; the
/// detail only reaches the server log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("{message}")]
    User {
        message: String,
        data: Option<Value>,
    },
    #[error("{message}")]
    Application { message: String, data: Value },
    #[error("unexpected error: {0}")]
    Unexpected(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ApiError {
    pub fn user(message: impl Into<String>) -> Self {
        ApiError::User {
            message: message.into(),
            data: None,
        }
    }

    pub fn user_with_data(message: impl Into<String>, data: Value) -> Self {
        ApiError::User {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn application(message: impl Into<String>, source: UpstreamError) -> Self {
        ApiError::Application {
            message: message.into(),
            data: source.diagnostic(),
        }
    }

    pub fn unexpected<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Unexpected(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::User { .. } => StatusCode::BAD_REQUEST,
            ApiError::Application { .. } | ApiError::Unexpected(_) | ApiError::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::MethodNotAllowed => return (status, "Method Not Allowed").into_response(),
            ApiError::User { message, data } => match data {
                Some(data) => json!({ "error": message, "data": data }),
                None => json!({ "error": message }),
            },
            ApiError::Application { message, data } => {
                tracing::error!("{}: {}", message, data);
                json!({ "error": APPLICATION_ERROR_MESSAGE })
            }
            ApiError::Unexpected(detail) => {
                tracing::error!("Unexpected error: {}", detail);
                json!({ "error": UNEXPECTED_ERROR_MESSAGE })
            }
            ApiError::Unknown(detail) => {
                tracing::error!("An unknown error occurred: {}", detail);
                json!({ "error": UNKNOWN_ERROR_MESSAGE })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// A failed call to one of the upstream services (OpenAI, Supabase).
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream returned {status}")]
    Status { status: u16, body: Value },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Builds a `Status` error from a non-success response, keeping the body
    /// as JSON when the service returned JSON.
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        UpstreamError::Status { status, body }
    }

    pub fn diagnostic(&self) -> Value {
        match self {
            UpstreamError::Status { status, body } => json!({ "status": status, "body": body }),
            UpstreamError::Transport(msg) => json!({ "transport": msg }),
            UpstreamError::Decode(msg) => json!({ "decode": msg }),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}
