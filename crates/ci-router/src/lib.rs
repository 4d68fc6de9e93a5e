//! Unified Router (spec.md §4.6): resolves a CI name and dispatches a
//! message via the transport its registry entry declares.

mod error;
mod forward;
mod router;
mod transport;

pub use error::{RouterError, RouterResult};
pub use router::{BroadcastOutcome, UnifiedRouter};
pub use transport::RouteOutcome;
