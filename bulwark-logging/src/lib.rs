//! Logging initialisation for Bulwark
//!
//! The resilience crates log through the `log` facade. This crate installs a
//! `tracing-subscriber` formatter that also receives those records, so an
//! application gets retry, breaker and limiter events next to its own spans.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
