//! Values flowing through the forwarding pipeline.
//!
//! Everything here is a plain value: the pipeline takes an [`InboundRequest`]
//! and a [`CookieJar`] in, and hands a [`ProxyResult`] (carrying the updated
//! jar) back out. Nothing is read from or written to ambient state.

use bytes::Bytes;

/// One inbound request as exposed by the host.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Request method as received (any case).
    pub method: String,

    /// Raw query string without the leading `?`; empty when absent.
    pub query: String,

    /// Inbound header names and values, case preserved as received.
    pub headers: Vec<(String, String)>,

    /// Raw request body.
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Ordered raw `Set-Cookie` lines carried across otherwise stateless calls.
///
/// The pipeline only reads entries (for the outbound `Cookie` header) and
/// appends new ones; it never reorders or deduplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.entries
    }
}

impl From<Vec<String>> for CookieJar {
    fn from(entries: Vec<String>) -> Self {
        Self { entries }
    }
}

impl Extend<String> for CookieJar {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

/// The request handed to a [`Transport`](super::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,

    /// Header lines in `Name: value` form.
    pub headers: Vec<String>,

    /// Present only for methods that carry a body.
    pub body: Option<Bytes>,
}

/// Unparsed upstream response as reported by the transport.
#[derive(Debug, Clone, Default)]
pub struct RawUpstreamResponse {
    /// Status code from transport metadata, if it reported one.
    pub status: Option<u16>,

    /// Header block followed by the body.
    pub raw: Bytes,

    /// Number of leading bytes of `raw` that form the header block.
    pub header_len: usize,
}

impl RawUpstreamResponse {
    /// Assemble a response from a header block and a body.
    pub fn from_parts(status: Option<u16>, header_block: &str, body: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(header_block.len() + body.len());
        raw.extend_from_slice(header_block.as_bytes());
        raw.extend_from_slice(body);
        Self {
            status,
            raw: Bytes::from(raw),
            header_len: header_block.len(),
        }
    }
}

/// Terminal artifact of one pipeline run.
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub status: u16,

    /// Header lines in emission order; repeats allowed.
    pub headers: Vec<String>,

    pub body: Bytes,

    /// Input jar followed by any cookies set by this response.
    pub cookies: CookieJar,
}

impl ProxyResult {
    /// Values of every header line whose name matches `name` case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.iter().filter_map(move |line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_from_parts() {
        let raw = RawUpstreamResponse::from_parts(Some(200), "HTTP/1.1 200 OK\r\n\r\n", b"hi");
        assert_eq!(raw.header_len, 19);
        assert_eq!(&raw.raw[raw.header_len..], b"hi");
    }

    #[test]
    fn test_header_values_case_insensitive() {
        let result = ProxyResult {
            status: 200,
            headers: vec![
                "Set-Cookie: a=1".into(),
                "Content-Type: text/plain".into(),
                "set-cookie: b=2".into(),
            ],
            body: Bytes::new(),
            cookies: CookieJar::new(),
        };
        let values: Vec<_> = result.header_values("SET-COOKIE").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }
}
