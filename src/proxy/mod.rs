//! Request/response forwarding pipeline.
//!
//! # Data Flow
//! ```text
//! InboundRequest + ProxyConfig + CookieJar
//!     → forwarder.rs (target URL, method check, header allow-list, Cookie header)
//!     → transport.rs (one outbound call, bounded by timeout)
//!     → translator.rs (split, cookies, header edit/filter, body transform)
//!     → ProxyResult (status, header lines, body, updated jar)
//! ```
//!
//! # Design Decisions
//! - Straight-line: each inbound request maps to exactly one outbound call
//! - Two exits before the call (405, 502), one after (transform failure)
//! - The cookie jar is a value in and a value out; the pipeline never stores it
//! - Header allow/deny decisions are case-insensitive everywhere

pub mod forwarder;
pub mod transform;
pub mod translator;
pub mod transport;
pub mod types;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use self::forwarder::{build_target_url, validate_method, Forwarder};
use self::transform::BodyTransform;
use self::translator::{translate, TranslateOptions};
use self::transport::Transport;

pub use self::transform::{transform_fn, RuleSet, TransformError, TransformRule};
pub use self::transport::{HttpTransport, TransportError};
pub use self::types::{CookieJar, InboundRequest, OutboundRequest, ProxyResult, RawUpstreamResponse};

pub const DEFAULT_ALLOWED_METHODS: [&str; 7] =
    ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];

pub const DEFAULT_FORWARD_HEADERS: [&str; 5] = [
    "Accept",
    "Accept-Language",
    "Authorization",
    "Content-Type",
    "User-Agent",
];

/// Value of the marker header added to translated responses.
pub const DEFAULT_MARKER: &str = concat!("reverse-forwarder/", env!("CARGO_PKG_VERSION"));

/// Prefix replacement applied to upstream `Location` headers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocationRewrite {
    pub from: String,
    pub to: String,
}

impl LocationRewrite {
    /// Rewrite one `Location:` line; lines not starting with `from` are kept.
    pub fn apply(&self, line: &str) -> String {
        let Some((name, value)) = line.split_once(':') else {
            return line.to_string();
        };
        match value.trim().strip_prefix(self.from.as_str()) {
            Some(rest) if !self.from.is_empty() => format!("{}: {}{}", name, self.to, rest),
            _ => line.to_string(),
        }
    }
}

/// Immutable per-request proxy configuration.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Target base URL, used verbatim as a prefix.
    pub target_url: String,
    pub allowed_methods: Vec<String>,
    pub allowed_forward_headers: Vec<String>,
    /// Response header names suppressed entirely.
    pub filter_response_headers: Vec<String>,
    pub transform: Option<Arc<dyn BodyTransform>>,
    pub location_rewrite: Option<LocationRewrite>,
    pub marker: String,
}

impl ProxyConfig {
    /// Config with the default allow-lists and no filters or hooks.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            allowed_methods: DEFAULT_ALLOWED_METHODS.iter().map(|s| s.to_string()).collect(),
            allowed_forward_headers: DEFAULT_FORWARD_HEADERS.iter().map(|s| s.to_string()).collect(),
            filter_response_headers: Vec::new(),
            transform: None,
            location_rewrite: None,
            marker: DEFAULT_MARKER.to_string(),
        }
    }

    pub fn with_allowed_methods(mut self, methods: Vec<String>) -> Self {
        self.allowed_methods = methods;
        self
    }

    pub fn with_allowed_forward_headers(mut self, headers: Vec<String>) -> Self {
        self.allowed_forward_headers = headers;
        self
    }

    pub fn with_filter_response_headers(mut self, headers: Vec<String>) -> Self {
        self.filter_response_headers = headers;
        self
    }

    pub fn with_transform(mut self, transform: impl BodyTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_location_rewrite(mut self, rewrite: LocationRewrite) -> Self {
        self.location_rewrite = Some(rewrite);
        self
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("target_url", &self.target_url)
            .field("allowed_methods", &self.allowed_methods)
            .field("allowed_forward_headers", &self.allowed_forward_headers)
            .field("filter_response_headers", &self.filter_response_headers)
            .field("transform", &self.transform.is_some())
            .field("location_rewrite", &self.location_rewrite)
            .field("marker", &self.marker)
            .finish()
    }
}

/// Runs the forwarding pipeline over a shared transport.
#[derive(Clone)]
pub struct ReverseProxy {
    transport: Arc<dyn Transport>,
}

impl ReverseProxy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Forward one inbound request and translate the upstream answer.
    ///
    /// On success the returned jar is `jar` plus any cookies the upstream set.
    /// On error nothing has been emitted and the caller's jar is unchanged.
    pub async fn handle(
        &self,
        request: InboundRequest,
        config: &ProxyConfig,
        jar: CookieJar,
    ) -> Result<ProxyResult, ProxyError> {
        let url = build_target_url(&config.target_url, &request.query);

        if !validate_method(&request.method, &config.allowed_methods) {
            tracing::warn!(method = %request.method, url = %url, "Method not allowed");
            return Err(ProxyError::MethodNotAllowed(request.method));
        }

        let forwarder = Forwarder::new(self.transport.as_ref());
        let outbound = forwarder.prepare(url, &request, &config.allowed_forward_headers, &jar);
        let raw = forwarder.execute(outbound).await.map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Upstream request failed");
            ProxyError::Transport(e)
        })?;

        let options = TranslateOptions {
            filter_list: &config.filter_response_headers,
            location_rewrite: config.location_rewrite.as_ref(),
            marker: &config.marker,
            transform: config.transform.as_deref(),
        };
        translate(raw, jar, &options).map_err(|e| {
            tracing::error!(error = %e, "Response transform failed");
            ProxyError::Transform(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Records every outbound request and answers with a canned response.
    struct MockTransport {
        calls: Mutex<Vec<OutboundRequest>>,
        response: Result<RawUpstreamResponse, TransportError>,
    }

    impl MockTransport {
        fn responding(status: u16, header_block: &str, body: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: Ok(RawUpstreamResponse::from_parts(Some(status), header_block, body)),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: Err(err),
            })
        }

        fn calls(&self) -> Vec<OutboundRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: OutboundRequest) -> Result<RawUpstreamResponse, TransportError> {
            self.calls.lock().unwrap().push(request);
            self.response.clone()
        }
    }

    const OK_BLOCK: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n";

    #[tokio::test]
    async fn test_disallowed_method_never_calls_upstream() {
        let transport = MockTransport::responding(200, OK_BLOCK, b"{}");
        let proxy = ReverseProxy::new(transport.clone());
        let config = ProxyConfig::new("https://api.example.com/v1")
            .with_allowed_methods(vec!["get".into(), "post".into()]);

        for method in ["DELETE", "put", "Trace"] {
            let err = proxy
                .handle(InboundRequest::new(method), &config, CookieJar::new())
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::METHOD_NOT_ALLOWED);
        }
        assert!(transport.calls().is_empty());

        proxy
            .handle(InboundRequest::new("Get"), &config, CookieJar::new())
            .await
            .unwrap();
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_outbound_request_for_get_with_query() {
        let transport = MockTransport::responding(200, OK_BLOCK, b"{}");
        let proxy = ReverseProxy::new(transport.clone());
        let config = ProxyConfig::new("https://api.example.com/v1");

        let request = InboundRequest::new("GET")
            .with_query("x=1")
            .with_header("Authorization", "Bearer abc")
            .with_header("Cookie", "foo=bar")
            .with_body("ignored");
        proxy.handle(request, &config, CookieJar::new()).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "GET");
        assert_eq!(calls[0].url, "https://api.example.com/v1?x=1");
        assert_eq!(calls[0].headers, vec!["Authorization: Bearer abc".to_string()]);
        assert_eq!(calls[0].body, None);
    }

    #[tokio::test]
    async fn test_body_only_for_body_methods() {
        let transport = MockTransport::responding(200, OK_BLOCK, b"{}");
        let proxy = ReverseProxy::new(transport.clone());
        let config = ProxyConfig::new("http://upstream.test");

        for method in ["post", "PUT", "Patch", "DELETE", "OPTIONS", "HEAD"] {
            let request = InboundRequest::new(method).with_body("payload");
            proxy.handle(request, &config, CookieJar::new()).await.unwrap();
        }
        let bodies: Vec<_> = transport.calls().into_iter().map(|c| c.body).collect();
        let payload = Some(Bytes::from_static(b"payload"));
        assert_eq!(
            bodies,
            vec![payload.clone(), payload.clone(), payload.clone(), payload, None, None]
        );
    }

    #[tokio::test]
    async fn test_jar_cookies_joined_into_one_header() {
        let transport = MockTransport::responding(200, OK_BLOCK, b"{}");
        let proxy = ReverseProxy::new(transport.clone());
        let config = ProxyConfig::new("http://upstream.test");
        let jar = CookieJar::from(vec![
            "Set-Cookie: a=1; Path=/".to_string(),
            "not a cookie".to_string(),
            "Set-Cookie: b=2".to_string(),
        ]);

        proxy.handle(InboundRequest::new("GET"), &config, jar).await.unwrap();
        assert_eq!(transport.calls()[0].headers, vec!["Cookie: a=1; b=2".to_string()]);
    }

    #[tokio::test]
    async fn test_cookies_appended_in_order() {
        let block = "HTTP/1.1 200 OK\r\nSet-Cookie: a=1; Path=/\r\nX-Other: 1\r\nSet-Cookie: b=2\r\nSet-Cookie: a=1; Path=/\r\n\r\n";
        let transport = MockTransport::responding(200, block, b"");
        let proxy = ReverseProxy::new(transport);
        let config = ProxyConfig::new("http://upstream.test");
        let jar = CookieJar::from(vec!["Set-Cookie: old=0".to_string()]);

        let result = proxy.handle(InboundRequest::new("GET"), &config, jar).await.unwrap();
        assert_eq!(result.header_values("set-cookie").count(), 3);
        assert_eq!(
            result.cookies.into_inner(),
            vec![
                "Set-Cookie: old=0",
                "Set-Cookie: a=1; Path=/",
                "Set-Cookie: b=2",
                "Set-Cookie: a=1; Path=/",
            ]
        );
    }

    #[tokio::test]
    async fn test_hop_headers_and_filtered_names_removed() {
        let block = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 2\r\nServer: upstream\r\nX-Keep: a\r\nx-keep: b\r\n\r\n";
        let transport = MockTransport::responding(200, block, b"ok");
        let proxy = ReverseProxy::new(transport);
        let config = ProxyConfig::new("http://upstream.test")
            .with_filter_response_headers(vec!["SERVER".into()]);

        let result = proxy
            .handle(InboundRequest::new("GET"), &config, CookieJar::new())
            .await
            .unwrap();
        assert_eq!(
            result.headers,
            vec![
                "X-Keep: a".to_string(),
                "x-keep: b".to_string(),
                format!("X-Proxy-By: {}", DEFAULT_MARKER),
            ]
        );
        assert_eq!(result.body, "ok");
    }

    #[tokio::test]
    async fn test_transform_receives_content_type() {
        let transport = MockTransport::responding(201, OK_BLOCK, br#"{"a":1}"#);
        let proxy = ReverseProxy::new(transport);
        let config = ProxyConfig::new("http://upstream.test").with_transform(transform_fn(
            |body: Bytes, content_type: &str| {
                assert_eq!(content_type, "application/json");
                Ok(Bytes::from([&body[..], &b"!"[..]].concat()))
            },
        ));

        let result = proxy
            .handle(InboundRequest::new("GET"), &config, CookieJar::new())
            .await
            .unwrap();
        assert_eq!(result.status, 201);
        assert_eq!(result.body, r#"{"a":1}!"#);
    }

    #[tokio::test]
    async fn test_transform_failure_is_terminal() {
        let transport = MockTransport::responding(200, OK_BLOCK, b"{}");
        let proxy = ReverseProxy::new(transport);
        let config = ProxyConfig::new("http://upstream.test").with_transform(transform_fn(
            |_body: Bytes, _ct: &str| Err(TransformError::new("cannot rewrite")),
        ));

        let err = proxy
            .handle(InboundRequest::new("GET"), &config, CookieJar::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Transform(ref e) if e.message() == "cannot rewrite"));
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_bad_gateway() {
        let transport = MockTransport::failing(TransportError::Timeout("operation timed out".into()));
        let proxy = ReverseProxy::new(transport.clone());
        let config = ProxyConfig::new("http://upstream.test");

        let err = proxy
            .handle(InboundRequest::new("GET"), &config, CookieJar::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("timed out"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_location_rewrite() {
        let rewrite = LocationRewrite {
            from: "http://backend:8080".into(),
            to: "https://public.example.com".into(),
        };
        assert_eq!(
            rewrite.apply("Location: http://backend:8080/login?next=/"),
            "Location: https://public.example.com/login?next=/"
        );
        assert_eq!(rewrite.apply("Location: /relative"), "Location: /relative");
    }
}
