//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ForwarderConfig (validated, immutable)
//!     → routes compiled into a RouteTable
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new config sent to the server
//!     → atomic swap of the route table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only routes are hot-reloaded; listener and timeouts need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ForwarderConfig, ListenerConfig, LogFormat, ObservabilityConfig, RouteConfig, SecurityConfig,
    SessionConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
