//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route patterns and target templates agree on parameters
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ForwarderConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ForwarderConfig, RouteConfig};
use crate::routing::matcher::PathPattern;
use crate::routing::router::{render_target, template_params};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid listener bind address '{0}'")]
    BindAddress(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("request timeout ({request}s) is shorter than the upstream timeout ({upstream}s)")]
    RequestTimeoutTooShort { request: u64, upstream: u64 },

    #[error("max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("session cookie name '{0}' is not a valid cookie name")]
    SessionCookieName(String),

    #[error("session.{0} must be greater than zero")]
    ZeroSessionLimit(&'static str),

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("duplicate route name '{0}'")]
    DuplicateRouteName(String),

    #[error("route '{route}': {reason}")]
    RoutePath { route: String, reason: String },

    #[error("route '{route}': target placeholder '{{{param}}}' is not captured by the path")]
    UnboundPlaceholder { route: String, param: String },

    #[error("route '{route}': target '{target}' is not an absolute http(s) URL")]
    TargetUrl { route: String, target: String },

    #[error("route '{route}': invalid method '{method}'")]
    Method { route: String, method: String },
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &ForwarderConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("upstream_secs", timeouts.upstream_secs),
        ("request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.request_secs < timeouts.upstream_secs {
        errors.push(ValidationError::RequestTimeoutTooShort {
            request: timeouts.request_secs,
            upstream: timeouts.upstream_secs,
        });
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let cookie_name = &config.session.cookie_name;
    if cookie_name.is_empty() || !cookie_name.bytes().all(is_token_byte) {
        errors.push(ValidationError::SessionCookieName(cookie_name.clone()));
    }
    if config.session.max_sessions == 0 {
        errors.push(ValidationError::ZeroSessionLimit("max_sessions"));
    }
    if config.session.idle_timeout_secs == 0 {
        errors.push(ValidationError::ZeroSessionLimit("idle_timeout_secs"));
    }

    let mut names = HashSet::new();
    for (idx, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(idx));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }
        validate_route(route, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    let pattern = match PathPattern::parse(&route.path) {
        Ok(p) => p,
        Err(e) => {
            errors.push(ValidationError::RoutePath {
                route: route.name.clone(),
                reason: e.to_string(),
            });
            return;
        }
    };

    let captured: HashSet<&str> = pattern.params().collect();
    let mut unbound = false;
    for param in template_params(&route.target_url) {
        if !captured.contains(param) {
            unbound = true;
            errors.push(ValidationError::UnboundPlaceholder {
                route: route.name.clone(),
                param: param.to_string(),
            });
        }
    }

    if !unbound {
        // Substitute a sample value for every placeholder before parsing.
        let sample = pattern.params().map(|p| (p.to_string(), "x".to_string())).collect::<Vec<_>>();
        let rendered = render_target(&route.target_url, &sample);
        let ok = url::Url::parse(&rendered)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::TargetUrl {
                route: route.name.clone(),
                target: route.target_url.clone(),
            });
        }
    }

    for method in &route.allowed_methods {
        if !method.bytes().all(is_token_byte) {
            errors.push(ValidationError::Method {
                route: route.name.clone(),
                method: method.clone(),
            });
        }
    }
}

/// RFC 7230 `tchar`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
