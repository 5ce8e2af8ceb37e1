//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the forwarder.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Deserializer, Serialize};

use crate::proxy::{
    LocationRewrite, ProxyConfig, RuleSet, TransformRule, DEFAULT_ALLOWED_METHODS,
    DEFAULT_FORWARD_HEADERS,
};

/// Root configuration for the forwarder.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Session cookie settings for cookie-jar persistence.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Proxy route definitions.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total upstream call timeout in seconds.
    pub upstream_secs: u64,

    /// Inbound request timeout (whole handler) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 35,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Session cookie used to key stored cookie jars.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_path: String,

    /// Upper bound on stored jars; the least recently used one is evicted.
    pub max_sessions: usize,

    /// Jars untouched for this long are dropped.
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "fwd_session".to_string(),
            cookie_path: "/".to_string(),
            max_sessions: 10_000,
            idle_timeout_secs: 1800,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Full,
    Compact,
}

/// One proxied path and the upstream it forwards to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path pattern, e.g. `/api/{tenant}/{*rest}`.
    pub path: String,

    /// Target URL template; `{param}` placeholders take captured path values.
    pub target_url: String,

    /// Inactive routes are kept in the file but never matched.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Empty means the default method set.
    #[serde(default, deserialize_with = "string_list")]
    pub allowed_methods: Vec<String>,

    /// Empty means the default header set.
    #[serde(default, deserialize_with = "string_list")]
    pub allowed_forward_headers: Vec<String>,

    #[serde(default, deserialize_with = "string_list")]
    pub filter_response_headers: Vec<String>,

    /// Persist upstream cookies in the caller's session.
    #[serde(default)]
    pub store_cookies_in_session: bool,

    #[serde(default)]
    pub response_transform: Vec<TransformRule>,

    #[serde(default)]
    pub location_rewrite: Option<LocationRewrite>,
}

fn default_true() -> bool {
    true
}

impl RouteConfig {
    /// Route with the given name, path and target and every other field defaulted.
    pub fn new(name: impl Into<String>, path: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            target_url: target_url.into(),
            active: true,
            priority: 0,
            allowed_methods: Vec::new(),
            allowed_forward_headers: Vec::new(),
            filter_response_headers: Vec::new(),
            store_cookies_in_session: false,
            response_transform: Vec::new(),
            location_rewrite: None,
        }
    }

    /// Effective method allow-list.
    pub fn methods(&self) -> Vec<String> {
        or_defaults(&self.allowed_methods, &DEFAULT_ALLOWED_METHODS)
    }

    /// Effective inbound header allow-list.
    pub fn forward_headers(&self) -> Vec<String> {
        or_defaults(&self.allowed_forward_headers, &DEFAULT_FORWARD_HEADERS)
    }

    /// Pipeline configuration for one request against the rendered target.
    pub fn proxy_config(&self, target_url: String) -> ProxyConfig {
        let mut config = ProxyConfig::new(target_url)
            .with_allowed_methods(self.methods())
            .with_allowed_forward_headers(self.forward_headers())
            .with_filter_response_headers(self.filter_response_headers.clone());
        if !self.response_transform.is_empty() {
            config = config.with_transform(RuleSet::new(self.response_transform.clone()));
        }
        if let Some(rewrite) = &self.location_rewrite {
            config = config.with_location_rewrite(rewrite.clone());
        }
        config
    }
}

fn or_defaults(values: &[String], defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        values.to_vec()
    }
}

/// Accept either a list or a comma/newline separated string; blanks dropped.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined.split([',', '\n']).map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ForwarderConfig::default();
        assert_eq!(config.timeouts.upstream_secs, 30);
        assert_eq!(config.session.cookie_name, "fwd_session");
        assert_eq!(config.session.max_sessions, 10_000);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_route_lists_accept_strings_and_arrays() {
        let config: ForwarderConfig = toml::from_str(
            r#"
            [[routes]]
            name = "api"
            path = "/api/{*rest}"
            target_url = "https://api.example.com/{rest}"
            allowed_methods = "get, post,\n,head"
            filter_response_headers = ["Server", " "]
            "#,
        )
        .unwrap();

        let route = &config.routes[0];
        assert!(route.active);
        assert_eq!(route.allowed_methods, vec!["get", "post", "head"]);
        assert_eq!(route.filter_response_headers, vec!["Server"]);
        assert_eq!(route.forward_headers().len(), DEFAULT_FORWARD_HEADERS.len());
    }

    #[test]
    fn test_proxy_config_from_route() {
        let mut route = RouteConfig::new("r", "/r", "http://upstream.test");
        route.allowed_methods = vec!["GET".into()];
        route.response_transform = vec![TransformRule::Replace {
            find: "a".into(),
            replace: "b".into(),
            content_type: None,
        }];

        let config = route.proxy_config("http://upstream.test/x".into());
        assert_eq!(config.target_url, "http://upstream.test/x");
        assert_eq!(config.allowed_methods, vec!["GET"]);
        assert!(config.transform.is_some());
        assert!(config.location_rewrite.is_none());
    }
}
