//! Upstream response translation.
//!
//! # Data Flow
//! ```text
//! RawUpstreamResponse
//!     → split_header_and_body (transport byte count is authoritative)
//!     → parse_header_lines (status line dropped)
//!     → extract_cookies (Set-Cookie lines appended to the jar)
//!     → edit_headers (drop Transfer-Encoding, Location hook, add marker)
//!     → resolve_content_type
//!     → finalize_headers (drop Content-Length and filtered names)
//!     → apply_body_transform
//!     → emit → ProxyResult
//! ```

use bytes::Bytes;

use super::transform::{BodyTransform, TransformError};
use super::types::{CookieJar, ProxyResult, RawUpstreamResponse};
use super::LocationRewrite;

/// Name of the diagnostic header added to every translated response.
pub const PROXY_MARKER_HEADER: &str = "X-Proxy-By";

/// Split the raw response at the header byte count reported by the transport.
pub fn split_header_and_body(raw: &Bytes, header_len: usize) -> (String, Bytes) {
    let at = header_len.min(raw.len());
    let header = String::from_utf8_lossy(&raw[..at]).into_owned();
    (header, raw.slice(at..))
}

/// Split a header block on CRLF, CR or LF; the first line is the status line.
pub fn parse_header_lines(block: &str) -> (String, Vec<String>) {
    let mut lines = block
        .trim()
        .split("\r\n")
        .flat_map(|l| l.split(['\r', '\n']))
        .map(str::to_string);
    let status_line = lines.next().unwrap_or_default();
    (status_line, lines.collect())
}

fn has_prefix(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Every `Set-Cookie:` line, kept whole, in arrival order.
pub fn extract_cookies(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| has_prefix(line, "Set-Cookie:"))
        .cloned()
        .collect()
}

/// Drop blank and `Transfer-Encoding` lines, apply the Location hook and
/// append the marker header. `Set-Cookie` lines stay in place.
pub fn edit_headers(
    lines: Vec<String>,
    location_rewrite: Option<&LocationRewrite>,
    marker: &str,
) -> Vec<String> {
    let mut edited: Vec<String> = lines
        .into_iter()
        .filter(|line| !line.is_empty())
        .filter(|line| !has_prefix(line, "Transfer-Encoding:"))
        .map(|line| match location_rewrite {
            Some(rewrite) if has_prefix(&line, "Location:") => rewrite.apply(&line),
            _ => line,
        })
        .collect();
    edited.push(format!("{}: {}", PROXY_MARKER_HEADER, marker));
    edited
}

/// Trimmed value of the first `Content-Type` line, or empty.
pub fn resolve_content_type(lines: &[String]) -> String {
    lines
        .iter()
        .find(|line| has_prefix(line, "Content-Type:"))
        .map(|line| line["Content-Type:".len()..].trim().to_string())
        .unwrap_or_default()
}

/// Drop `Content-Length` and any header whose name is in `filter_list`.
pub fn finalize_headers(lines: Vec<String>, filter_list: &[String]) -> Vec<String> {
    lines
        .into_iter()
        .filter(|line| !has_prefix(line, "Content-Length:"))
        .filter(|line| {
            let name = line.split(':').next().unwrap_or_default().trim();
            let filtered = filter_list
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .any(|f| f.eq_ignore_ascii_case(name));
            if filtered {
                tracing::debug!(header = %name, "Filtered response header");
            }
            !filtered
        })
        .collect()
}

/// Run the hook, if any. Without one the body passes through untouched.
pub fn apply_body_transform(
    body: Bytes,
    content_type: &str,
    hook: Option<&dyn BodyTransform>,
) -> Result<Bytes, TransformError> {
    match hook {
        Some(hook) => hook.transform(body, content_type),
        None => Ok(body),
    }
}

/// Assemble the final result; the status defaults to 200 when unreported.
pub fn emit(status: Option<u16>, headers: Vec<String>, body: Bytes, cookies: CookieJar) -> ProxyResult {
    ProxyResult {
        status: status.unwrap_or(200),
        headers,
        body,
        cookies,
    }
}

/// Everything the translator needs besides the response itself.
pub struct TranslateOptions<'a> {
    pub filter_list: &'a [String],
    pub location_rewrite: Option<&'a LocationRewrite>,
    pub marker: &'a str,
    pub transform: Option<&'a dyn BodyTransform>,
}

/// Turn a raw upstream response into a [`ProxyResult`].
///
/// `jar` is the caller's input jar; cookies set by this response are
/// appended after its entries.
pub fn translate(
    raw: RawUpstreamResponse,
    mut jar: CookieJar,
    options: &TranslateOptions<'_>,
) -> Result<ProxyResult, TransformError> {
    let (block, body) = split_header_and_body(&raw.raw, raw.header_len);
    let (status_line, lines) = parse_header_lines(&block);
    tracing::debug!(status_line = %status_line, headers = lines.len(), "Parsed upstream headers");

    jar.extend(extract_cookies(&lines));

    let edited = edit_headers(lines, options.location_rewrite, options.marker);
    let content_type = resolve_content_type(&edited);
    let headers = finalize_headers(edited, options.filter_list);
    let body = apply_body_transform(body, &content_type, options.transform)?;

    Ok(emit(raw.status, headers, body, jar))
}
