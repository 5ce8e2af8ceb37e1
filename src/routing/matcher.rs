//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse route patterns (`/static`, `/{param}`, trailing `/{*rest}`)
//! - Match request paths segment by segment
//! - Capture parameter values verbatim (no percent-decoding)
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - A parameter matches exactly one non-empty segment
//! - A catch-all matches the remainder, including nothing
//! - Paths with `.` or `..` segments (also percent-encoded or split by `\`)
//!   never match, so a capture cannot climb out of the target prefix
//! - No regex to guarantee O(n) matching

use thiserror::Error;

/// Why a pattern could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("path pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("path pattern '{0}' has an empty parameter name")]
    EmptyParam(String),

    #[error("path pattern '{0}' has a catch-all that is not the last segment")]
    CatchAllNotLast(String),

    #[error("path pattern '{pattern}' captures '{param}' twice")]
    DuplicateParam { pattern: String, param: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// Captured `(name, value)` pairs in pattern order.
pub type Captures = Vec<(String, String)>;

/// A compiled route path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// `.` or `..`, in any mix of literal and `%2e` spellings. URL parsers treat
/// `\` as a separator for http(s), so each `\`-delimited piece is checked.
fn is_dot_segment(segment: &str) -> bool {
    segment.split('\\').any(|piece| {
        let decoded = piece.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let parts = split_path(pattern);
        let mut segments = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (catch_all, name) = match inner.strip_prefix('*') {
                        Some(name) => (true, name),
                        None => (false, inner),
                    };
                    if name.is_empty() {
                        return Err(PatternError::EmptyParam(pattern.to_string()));
                    }
                    if catch_all && idx + 1 != parts.len() {
                        return Err(PatternError::CatchAllNotLast(pattern.to_string()));
                    }
                    let taken = segments.iter().any(|s| {
                        matches!(s, Segment::Param(n) | Segment::CatchAll(n) if n == name)
                    });
                    if taken {
                        return Err(PatternError::DuplicateParam {
                            pattern: pattern.to_string(),
                            param: name.to_string(),
                        });
                    }
                    if catch_all {
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of every captured parameter.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::CatchAll(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path, returning captures on success.
    pub fn matches(&self, path: &str) -> Option<Captures> {
        let parts = split_path(path);
        if parts.iter().any(|part| is_dot_segment(part)) {
            return None;
        }
        let mut captures = Vec::new();

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(idx) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => match parts.get(idx) {
                    Some(value) if !value.is_empty() => {
                        captures.push((name.clone(), value.to_string()));
                    }
                    _ => return None,
                },
                Segment::CatchAll(name) => {
                    let rest = parts.get(idx..).map(|r| r.join("/")).unwrap_or_default();
                    captures.push((name.clone(), rest));
                    return Some(captures);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(captures)
    }
}
