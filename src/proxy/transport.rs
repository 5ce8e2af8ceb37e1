//! Outbound HTTP execution.
//!
//! # Responsibilities
//! - Issue exactly one upstream call per pipeline run
//! - Bound the call with connect and total timeouts
//! - Report the response as a raw header block plus body
//!
//! # Design Decisions
//! - Redirects are never followed; 3xx responses go back to the caller
//! - No retries; a failed or timed-out call is a `TransportError`
//! - The header block is rebuilt from parsed headers with Title-Case names,
//!   one line per value, so repeated headers survive
//! - Lines come out grouped by header name in first-appearance order, since
//!   `HeaderMap` keeps all values of a name together. Interleaved upstream
//!   headers (`Set-Cookie: a`, `X: 1`, `Set-Cookie: b`) become `a`, `b`, `X`;
//!   the relative order of values for one name is preserved

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use super::types::{OutboundRequest, RawUpstreamResponse};
use crate::config::TimeoutConfig;

/// Errors raised while executing the outbound call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The upstream did not answer within the configured timeout.
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// Connection could not be established (refused, DNS, TLS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built (bad method or URL).
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// Any other failure while sending or reading the response.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::InvalidRequest(_) => "invalid_request",
            TransportError::Request(_) => "request",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let text = error_chain(&err);
        if err.is_timeout() {
            TransportError::Timeout(text)
        } else if err.is_connect() {
            TransportError::Connect(text)
        } else if err.is_builder() {
            TransportError::InvalidRequest(text)
        } else {
            TransportError::Request(text)
        }
    }
}

/// Render an error and all of its sources as one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Executes one outbound request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<RawUpstreamResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client from the timeout settings.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .build()
            .map_err(|e| TransportError::InvalidRequest(error_chain(&e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<RawUpstreamResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.method, e)))?;

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .headers(header_map(&request.headers));
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let block = header_block(response.version(), status, response.headers());

        let body = response.bytes().await?;

        tracing::debug!(
            status = status.as_u16(),
            header_bytes = block.len(),
            body_bytes = body.len(),
            "Upstream responded"
        );

        Ok(RawUpstreamResponse::from_parts(
            Some(status.as_u16()),
            &block,
            &body,
        ))
    }
}

/// Status line plus one Title-Case line per header value, ending in a blank line.
fn header_block(version: reqwest::Version, status: reqwest::StatusCode, headers: &HeaderMap) -> String {
    let mut block = format!(
        "{:?} {} {}\r\n",
        version,
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in headers {
        block.push_str(&title_case(name.as_str()));
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    block.push_str("\r\n");
    block
}

/// Convert `Name: value` lines into a header map, skipping malformed lines.
fn header_map(lines: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line = %line, "Skipping malformed outbound header");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(line = %line, "Skipping invalid outbound header"),
        }
    }
    headers
}

/// `content-type` → `Content-Type`.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper = c == '-';
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("set-cookie"), "Set-Cookie");
        assert_eq!(title_case("x-proxy-by"), "X-Proxy-By");
        assert_eq!(title_case("etag"), "Etag");
    }

    #[test]
    fn test_header_map_keeps_repeats_and_skips_garbage() {
        let map = header_map(&[
            "Accept: text/html".into(),
            "no colon here".into(),
            "Bad Name: x".into(),
            "Accept: application/json".into(),
        ]);
        assert_eq!(map.get_all("accept").iter().count(), 2);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_header_block_groups_values_by_name() {
        let headers = header_map(&[
            "set-cookie: a=1".into(),
            "x-other: 1".into(),
            "set-cookie: b=2".into(),
        ]);
        let block = header_block(reqwest::Version::HTTP_11, reqwest::StatusCode::OK, &headers);
        assert_eq!(
            block,
            "HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nX-Other: 1\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = HttpTransport::new(&TimeoutConfig::default()).unwrap();
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = transport
            .execute(OutboundRequest {
                method: "GET".into(),
                url: format!("http://127.0.0.1:{}/", port),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_method_rejected_before_send() {
        let transport = HttpTransport::new(&TimeoutConfig::default()).unwrap();
        let err = transport
            .execute(OutboundRequest {
                method: "GE T".into(),
                url: "http://127.0.0.1:1/".into(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }
}
