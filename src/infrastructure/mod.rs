//! Infrastructure layer: cross-cutting concerns the domain and application
//! layers depend on but don't own — configuration loading, logging setup,
//! and the shared retry/rate-limit primitives the adapters layer builds on.

pub mod config;
pub mod logging;
pub mod resilience;
