//! Shared state handed to every axum handler (spec.md §4.8).

use std::sync::Arc;

use ci_registry::RegistryStore;
use ci_router::UnifiedRouter;
use ci_supervisor::ToolSupervisor;

/// All mutating components are themselves safe for concurrent callers, so
/// the server clones this state per connection rather than serializing
/// requests behind a server-wide lock (spec.md §4.8 "Concurrency").
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryStore>,
    pub router: Arc<UnifiedRouter>,
    pub supervisor: Arc<ToolSupervisor>,
    pub health: Arc<ci_health::HealthMonitor>,
}
