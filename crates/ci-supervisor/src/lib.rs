//! Tool Supervisor (spec.md §4.5): launches, health-checks, restarts and
//! terminates tool-class CI instances behind a Socket Bridge.

mod definition;
mod error;
mod restart;
mod supervisor;

pub use definition::{DefinitionsFile, ToolDefinition};
pub use error::{SupervisorError, SupervisorResult};
pub use restart::RestartState;
pub use supervisor::ToolSupervisor;
