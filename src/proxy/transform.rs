//! Response body transforms.
//!
//! A transform is a typed value implementing [`BodyTransform`]. Two kinds ship:
//! [`transform_fn`] wraps a closure, and [`RuleSet`] applies a declarative list
//! of [`TransformRule`]s loaded from route configuration. Rules have a fixed,
//! narrow grammar; nothing caller-supplied is ever evaluated as code.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A body transform failure. Surfaces as a terminal pipeline error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Rewrites a response body given its resolved content type.
pub trait BodyTransform: Send + Sync {
    fn transform(&self, body: Bytes, content_type: &str) -> Result<Bytes, TransformError>;
}

/// Adapter returned by [`transform_fn`].
#[derive(Clone)]
pub struct FnTransform<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform").finish_non_exhaustive()
    }
}

/// Use a closure as a [`BodyTransform`].
pub fn transform_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(Bytes, &str) -> Result<Bytes, TransformError> + Send + Sync,
{
    FnTransform { f }
}

impl<F> BodyTransform for FnTransform<F>
where
    F: Fn(Bytes, &str) -> Result<Bytes, TransformError> + Send + Sync,
{
    fn transform(&self, body: Bytes, content_type: &str) -> Result<Bytes, TransformError> {
        (self.f)(body, content_type)
    }
}

/// One declarative body rewrite.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformRule {
    /// Replace every occurrence of `find` in a UTF-8 body.
    Replace {
        find: String,
        replace: String,
        #[serde(default)]
        content_type: Option<String>,
    },

    /// Set the value at a JSON pointer (the parent must be an object).
    JsonSet {
        pointer: String,
        value: Value,
        #[serde(default = "default_json_content_type")]
        content_type: Option<String>,
    },

    /// Remove the value at a JSON pointer if present.
    JsonRemove {
        pointer: String,
        #[serde(default = "default_json_content_type")]
        content_type: Option<String>,
    },
}

fn default_json_content_type() -> Option<String> {
    Some("json".to_string())
}

impl TransformRule {
    /// Content-type substring gating this rule; `None` applies to every body.
    fn content_type(&self) -> Option<&str> {
        match self {
            TransformRule::Replace { content_type, .. }
            | TransformRule::JsonSet { content_type, .. }
            | TransformRule::JsonRemove { content_type, .. } => content_type.as_deref(),
        }
    }

    fn applies_to(&self, content_type: &str) -> bool {
        match self.content_type() {
            None => true,
            Some(needle) => content_type
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
        }
    }

    fn apply(&self, body: Bytes) -> Result<Bytes, TransformError> {
        match self {
            TransformRule::Replace { find, replace, .. } => {
                if find.is_empty() {
                    return Ok(body);
                }
                let text = std::str::from_utf8(&body)
                    .map_err(|e| TransformError::new(format!("body is not valid UTF-8: {}", e)))?;
                Ok(Bytes::from(text.replace(find.as_str(), replace)))
            }
            TransformRule::JsonSet { pointer, value, .. } => {
                let mut doc = parse_json(&body)?;
                let (parent, key) = split_pointer(pointer)?;
                let target = doc
                    .pointer_mut(parent)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| {
                        TransformError::new(format!("no JSON object at pointer '{}'", parent))
                    })?;
                target.insert(key, value.clone());
                to_bytes(&doc)
            }
            TransformRule::JsonRemove { pointer, .. } => {
                let mut doc = parse_json(&body)?;
                let (parent, key) = split_pointer(pointer)?;
                if let Some(target) = doc.pointer_mut(parent) {
                    match target {
                        Value::Object(map) => {
                            map.remove(&key);
                        }
                        Value::Array(items) => {
                            if let Ok(idx) = key.parse::<usize>() {
                                if idx < items.len() {
                                    items.remove(idx);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                to_bytes(&doc)
            }
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, TransformError> {
    serde_json::from_slice(body)
        .map_err(|e| TransformError::new(format!("body is not valid JSON: {}", e)))
}

fn to_bytes(doc: &Value) -> Result<Bytes, TransformError> {
    serde_json::to_vec(doc)
        .map(Bytes::from)
        .map_err(|e| TransformError::new(format!("failed to encode JSON: {}", e)))
}

/// Split `/a/b/c` into (`/a/b`, `c`), decoding the last reference token.
fn split_pointer(pointer: &str) -> Result<(&str, String), TransformError> {
    if !pointer.starts_with('/') {
        return Err(TransformError::new(format!(
            "invalid JSON pointer '{}': must start with '/'",
            pointer
        )));
    }
    let idx = pointer.rfind('/').unwrap_or(0);
    let token = pointer[idx + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&pointer[..idx], token))
}

/// Ordered list of rules applied one after another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<TransformRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl BodyTransform for RuleSet {
    fn transform(&self, body: Bytes, content_type: &str) -> Result<Bytes, TransformError> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to(content_type))
            .try_fold(body, |body, rule| rule.apply(body))
    }
}
