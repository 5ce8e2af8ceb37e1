//! Pipeline error taxonomy and its HTTP rendering.
//!
//! | Variant            | Status | Body                              |
//! |--------------------|--------|-----------------------------------|
//! | `MethodNotAllowed` | 405    | `text/plain` fixed message        |
//! | `Transport`        | 502    | `text/plain` with the error text  |
//! | `Transform`        | 500    | JSON `{"error": "<message>"}`     |

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::proxy::{TransformError, TransportError};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Terminal failures of one pipeline run. None of them are retried.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Request method is not in the route's allow-list; nothing was sent upstream.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The outbound call could not be completed or timed out.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The configured body transform failed; no response was emitted.
    #[error("{0}")]
    Transform(#[from] TransformError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::Transport(e) => e.kind(),
            ProxyError::Transform(_) => "transform",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ProxyError::MethodNotAllowed(_) => {
                (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], "Method not allowed.").into_response()
            }
            ProxyError::Transport(e) => (
                status,
                [(header::CONTENT_TYPE, TEXT_PLAIN)],
                format!("Proxy error: {}", e),
            )
                .into_response(),
            ProxyError::Transform(e) => {
                (status, Json(json!({ "error": e.message() }))).into_response()
            }
        }
    }
}
