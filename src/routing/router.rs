//! Route lookup and target rendering.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for a request path
//! - Render the route's target URL template with captured values
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Sorted by priority (desc), then declaration order; first match wins
//! - O(n) pattern scan (acceptable for typical route counts)
//! - Explicit `None` rather than silent default

use std::sync::Arc;

use crate::config::RouteConfig;
use crate::routing::matcher::{Captures, PathPattern};

#[derive(Debug)]
struct CompiledRoute {
    pattern: PathPattern,
    config: Arc<RouteConfig>,
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteConfig>,
    pub captures: Captures,
}

impl RouteMatch {
    /// The route's target URL with captures substituted.
    pub fn target_url(&self) -> String {
        render_target(&self.route.target_url, &self.captures)
    }
}

/// Immutable table of active routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile active routes. Routes with unparseable paths are skipped.
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut compiled: Vec<CompiledRoute> = routes
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| match PathPattern::parse(&r.path) {
                Ok(pattern) => Some(CompiledRoute {
                    pattern,
                    config: Arc::new(r.clone()),
                }),
                Err(e) => {
                    tracing::error!(route = %r.name, error = %e, "Skipping route with invalid path");
                    None
                }
            })
            .collect();

        // Stable sort keeps declaration order among equal priorities.
        compiled.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));

        tracing::info!(routes = compiled.len(), "Route table compiled");
        Self { routes: compiled }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching `path`.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|r| {
            r.pattern.matches(path).map(|captures| RouteMatch {
                route: r.config.clone(),
                captures,
            })
        })
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Every `{name}` placeholder in a target template, in order.
pub fn template_params(template: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_ident(&after[..end]) => {
                params.push(&after[..end]);
                rest = &after[end + 1..];
            }
            _ => rest = after,
        }
    }
    params
}

/// Replace `{name}` placeholders with captured values; unknown ones are kept.
pub fn render_target(template: &str, captures: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after.find('}').and_then(|end| {
            let name = &after[..end];
            captures
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| (v.as_str(), end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_and_declaration_order() {
        let mut low = RouteConfig::new("catch", "/{*rest}", "http://a.test/{rest}");
        low.priority = 0;
        let mut high = RouteConfig::new("api", "/api/{*rest}", "http://b.test/{rest}");
        high.priority = 10;
        let shadowed = RouteConfig::new("later", "/{*rest}", "http://c.test/");
        let mut inactive = RouteConfig::new("off", "/api/{*rest}", "http://d.test/");
        inactive.priority = 100;
        inactive.active = false;

        let table = RouteTable::from_config(&[low, high, shadowed, inactive]);
        assert_eq!(table.len(), 3);

        let m = table.match_path("/api/users").unwrap();
        assert_eq!(m.route.name, "api");
        assert_eq!(m.target_url(), "http://b.test/users");

        let m = table.match_path("/other").unwrap();
        assert_eq!(m.route.name, "catch");
    }

    #[test]
    fn test_no_match() {
        let table = RouteTable::from_config(&[RouteConfig::new("a", "/a", "http://a.test")]);
        assert!(table.match_path("/b").is_none());
        assert!(RouteTable::default().match_path("/").is_none());
    }

    #[test]
    fn test_template_params() {
        assert_eq!(
            template_params("https://{host}.test/{id}/x?q={ q }&{}"),
            vec!["host", "id"]
        );
    }

    #[test]
    fn test_render_target() {
        let captures = vec![("id".to_string(), "42".to_string())];
        assert_eq!(render_target("http://a.test/users/{id}", &captures), "http://a.test/users/42");
        assert_eq!(render_target("http://a.test/{other}/{id}", &captures), "http://a.test/{other}/42");
        assert_eq!(render_target("http://a.test/{", &captures), "http://a.test/{");
    }
}
