//! Shared types for the CI orchestration core.
//!
//! This crate is the single source of truth for the shapes that cross
//! component boundaries: [`CiEntry`], [`ContextState`], [`Message`],
//! [`ToolInstance`], [`PortLease`], and the error kinds every other crate in
//! the workspace wraps. Nothing here talks to a file, a socket, or a process;
//! that belongs to `ci-registry`, `ci-bus`, `ci-bridge`, and friends.

pub mod context;
pub mod entry;
pub mod error;
pub mod instance;
pub mod message;
pub mod port;

pub use context::{ContextPatch, ContextState, PromptMessage, Role};
pub use entry::{CiEntry, CiType, DefinedBy, MessageFormat};
pub use error::{CoreError, CoreResult};
pub use instance::ToolInstance;
pub use message::{Message, MessageType};
pub use port::PortLease;
