//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber's `wait` resolves
//!     → server stops accepting, drains in-flight requests, exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
