//! Outbound request construction.
//!
//! # Responsibilities
//! - Build the target URL from the configured base and inbound query
//! - Reject methods outside the allow-list before anything is sent
//! - Forward only allow-listed inbound headers
//! - Turn the cookie jar into one outbound `Cookie` header
//! - Hand the finished request to the transport
//!
//! # Design Decisions
//! - The target base is used verbatim as a prefix; no re-encoding or joining
//! - `Content-Length` is never forwarded; the client library sets it
//! - All jar cookies are attached, joined as `a=1; b=2`, in jar order

use bytes::Bytes;

use super::transport::{Transport, TransportError};
use super::types::{CookieJar, InboundRequest, OutboundRequest, RawUpstreamResponse};

/// Methods whose inbound body is passed upstream.
pub const METHODS_WITH_BODY: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

const SET_COOKIE_PREFIX: &str = "set-cookie:";

/// Append `query` to `base` with `?` or `&` as appropriate.
pub fn build_target_url(base: &str, query: &str) -> String {
    if query.is_empty() {
        return base.to_string();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, sep, query)
}

/// Case-insensitive membership test of `method` in `allowed`.
pub fn validate_method(method: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|m| m.trim().eq_ignore_ascii_case(method))
}

/// Trim the name and collapse internal whitespace runs into single hyphens.
pub fn normalize_header_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Select the inbound headers that may be forwarded, as `Name: value` lines.
pub fn select_forward_headers(inbound: &[(String, String)], allow_list: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, value) in inbound {
        let name = normalize_header_name(name);
        let allowed = allow_list
            .iter()
            .any(|a| a.trim().eq_ignore_ascii_case(&name));
        if !allowed {
            tracing::debug!(header = %name, "Filtered inbound header");
            continue;
        }
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        lines.push(format!("{}: {}", name, value));
    }
    lines
}

/// The `name=value` fragment of a `Set-Cookie:` line, if it is one.
pub fn cookie_pair(line: &str) -> Option<&str> {
    let head = line.get(..SET_COOKIE_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(SET_COOKIE_PREFIX) {
        return None;
    }
    let rest = &line[SET_COOKIE_PREFIX.len()..];
    let pair = rest.split(';').next().unwrap_or_default().trim();
    if pair.is_empty() {
        None
    } else {
        Some(pair)
    }
}

/// Build the outbound `Cookie` header line from every parseable jar entry.
pub fn attach_cookies(jar: &CookieJar) -> Option<String> {
    let pairs: Vec<&str> = jar
        .entries()
        .iter()
        .filter_map(|entry| {
            let pair = cookie_pair(entry);
            if pair.is_none() {
                tracing::debug!(entry = %entry, "Skipping unparseable cookie jar entry");
            }
            pair
        })
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(format!("Cookie: {}", pairs.join("; ")))
    }
}

/// Builds and sends the outbound request for one inbound request.
pub struct Forwarder<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> Forwarder<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Assemble the outbound request. The body rides along only for
    /// methods in [`METHODS_WITH_BODY`].
    pub fn prepare(
        &self,
        url: String,
        request: &InboundRequest,
        allow_list: &[String],
        jar: &CookieJar,
    ) -> OutboundRequest {
        let mut headers = select_forward_headers(&request.headers, allow_list);
        headers.extend(attach_cookies(jar));

        let body = METHODS_WITH_BODY
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method))
            .then(|| Bytes::clone(&request.body));

        OutboundRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        }
    }

    /// Issue the call once. Failures are returned as-is, never retried.
    pub async fn execute(
        &self,
        outbound: OutboundRequest,
    ) -> Result<RawUpstreamResponse, TransportError> {
        tracing::debug!(
            method = %outbound.method,
            url = %outbound.url,
            headers = outbound.headers.len(),
            "Forwarding request"
        );
        self.transport.execute(outbound).await
    }
}
