//! Per-CI health status tracked by the monitor (spec.md §4.7).

/// Liveness classification for one CI, as last observed by a monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Activity observed within the silence window; no probe outstanding.
    Responsive,
    /// A probe was sent but no response arrived within the probe timeout.
    Unresponsive,
}

/// The outcome of one monitor pass over a single CI, returned by
/// [`crate::monitor::HealthMonitor::tick`] for observability and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub name: String,
    pub status: HealthStatus,
    pub restarted: bool,
}
