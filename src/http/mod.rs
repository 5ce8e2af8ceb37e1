//! HTTP host subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace, timeout, body limit)
//!     → routing (path → route + captures)
//!     → session (load cookie jar when the route stores cookies)
//!     → request.rs (axum request → InboundRequest)
//!     → proxy pipeline (forward + translate)
//!     → response.rs (ProxyResult → axum response) or ProxyError rendering
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";
