//! Single-hop HTTP reverse forwarder library.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod session;

pub use config::ForwarderConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{CookieJar, InboundRequest, ProxyConfig, ProxyResult, ReverseProxy};
