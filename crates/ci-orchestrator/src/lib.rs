//! Lifecycle Coordinator (spec.md §4.9): sequences startup and shutdown of
//! the orchestration core and the platform-wide supervisory AIs. Hosts the
//! `ci-orchestratord` binary, which wires every other component crate
//! together behind the MCP server.

pub mod config;
pub mod lifecycle;
pub mod platform_ai;

pub use config::Config;
pub use lifecycle::{shutdown, start, Core};
