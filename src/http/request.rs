//! Inbound request conversion.
//!
//! # Responsibilities
//! - Buffer the request body up to the configured limit
//! - Expose method, raw query, headers and body as an `InboundRequest`
//!
//! # Design Decisions
//! - Header values that are not valid UTF-8 are converted lossily
//! - Header names arrive lowercased from the HTTP stack; allow-list
//!   matching is case-insensitive so this has no effect on forwarding
//! - A body over the limit is 413 whether or not it declared a length;
//!   any other read failure is 400

use std::error::Error as _;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;

use crate::proxy::InboundRequest;

/// Values of every inbound `Cookie` header.
pub fn cookie_headers(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
}

/// Whether a body read failed on a length limit, ours or an outer layer's.
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = err.source();
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Convert an axum request, reading at most `limit` body bytes.
pub async fn into_inbound(request: Request<Body>, limit: usize) -> Result<InboundRequest, Response> {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) if exceeds_limit(&e) => {
            tracing::warn!(limit, "Request body exceeds limit");
            return Err((StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return Err((StatusCode::BAD_REQUEST, "Failed to read request body").into_response());
        }
    };

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    Ok(InboundRequest {
        method: parts.method.as_str().to_string(),
        query: parts.uri.query().unwrap_or_default().to_string(),
        headers,
        body,
    })
}
