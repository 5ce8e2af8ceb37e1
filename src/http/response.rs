//! Outbound response conversion.
//!
//! # Responsibilities
//! - Copy the upstream status through unchanged
//! - Emit header lines in order, keeping repeats
//! - Write the (possibly transformed) body
//!
//! # Design Decisions
//! - Lines are split at the first `:`; unrepresentable lines are skipped
//! - Content-Length is set by the HTTP stack from the final body

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};

use crate::proxy::ProxyResult;

/// Turn a pipeline result into the client-facing response.
pub fn into_response(result: ProxyResult) -> Response {
    let status = StatusCode::from_u16(result.status).unwrap_or_else(|_| {
        tracing::warn!(status = result.status, "Upstream status out of range");
        StatusCode::BAD_GATEWAY
    });

    let mut response = Response::new(Body::from(result.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for line in &result.headers {
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line = %line, "Skipping header line without ':'");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(line = %line, "Skipping unrepresentable header line"),
        }
    }

    response
}
