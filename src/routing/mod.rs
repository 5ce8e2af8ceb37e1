//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate path pattern, capture parameters)
//!     → Return: RouteMatch (route + captures) or None
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Drop inactive routes
//!     → Sort by priority
//!     → Compile path patterns
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per config, immutable at runtime
//! - Reload swaps the whole table atomically
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError};
pub use router::{RouteMatch, RouteTable};
