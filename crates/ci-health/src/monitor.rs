//! Health Monitor (spec.md §4.7): detects stalled tool-class CIs and
//! restarts them if policy allows.
//!
//! Activity-based, not poll-based: a caller on the response path (today,
//! the Unified Router, after a successful dispatch) calls
//! [`HealthMonitor::record_activity`]. Silence is computed against that
//! timestamp rather than by tailing a log, so the monitor never has to
//! parse output it does not otherwise need.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ci_core::{CiType, Message};
use ci_registry::{ListFilter, RegistryStore};
use ci_router::UnifiedRouter;
use ci_supervisor::ToolSupervisor;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::HealthResult;
use crate::status::{HealthStatus, TickOutcome};

/// Default tick interval (spec.md §4.7).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);
/// Silence threshold before a CI is probed.
pub const SILENCE_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// How long to wait for a probe response before marking unresponsive.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Observes activity on tool-class CIs and escalates to the Tool Supervisor
/// when one goes quiet and stops responding to a probe.
pub struct HealthMonitor {
    registry: Arc<RegistryStore>,
    router: Arc<UnifiedRouter>,
    supervisor: Arc<ToolSupervisor>,
    last_activity: DashMap<String, Instant>,
    last_probe: DashMap<String, Instant>,
    status: DashMap<String, HealthStatus>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        registry: Arc<RegistryStore>,
        router: Arc<UnifiedRouter>,
        supervisor: Arc<ToolSupervisor>,
    ) -> Self {
        Self {
            registry,
            router,
            supervisor,
            last_activity: DashMap::new(),
            last_probe: DashMap::new(),
            status: DashMap::new(),
        }
    }

    /// Called on the response path whenever `name` produces output, so
    /// silence is measured from real activity rather than a fixed clock.
    pub fn record_activity(&self, name: &str) {
        self.last_activity.insert(name.to_string(), Instant::now());
        self.status.insert(name.to_string(), HealthStatus::Responsive);
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.status.get(name).map(|s| *s)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, HealthStatus> {
        self.status
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    fn silence(&self, name: &str) -> Duration {
        let now = Instant::now();
        let last_activity = self.last_activity.get(name).map(|t| *t);
        let last_probe = self.last_probe.get(name).map(|t| *t);
        let most_recent = match (last_activity, last_probe) {
            (Some(a), Some(p)) => a.max(p),
            (Some(a), None) => a,
            (None, Some(p)) => p,
            (None, None) => return Duration::MAX,
        };
        now.saturating_duration_since(most_recent)
    }

    /// One monitor pass over every running tool-class CI (spec.md §4.7
    /// algorithm). Returns a per-CI outcome for observability and tests;
    /// production callers drive this from a periodic loop.
    pub async fn tick(&self) -> HealthResult<Vec<TickOutcome>> {
        let tools = self.registry.list(&ListFilter {
            ci_type: Some(CiType::Tool),
            defined_by: None,
            include_hidden: false,
        });

        let mut outcomes = Vec::new();
        for entry in tools {
            if !entry.running {
                continue;
            }
            let silence = self.silence(&entry.name);
            if silence <= SILENCE_THRESHOLD {
                continue;
            }

            outcomes.push(self.probe_and_maybe_restart(&entry.name).await?);
        }
        Ok(outcomes)
    }

    async fn probe_and_maybe_restart(&self, name: &str) -> HealthResult<TickOutcome> {
        self.last_probe.insert(name.to_string(), Instant::now());
        let probe = Message::chat("health-monitor", name, "ping");

        let responded = tokio::time::timeout(PROBE_TIMEOUT, self.router.send(name, probe))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);

        if responded {
            self.record_activity(name);
            debug!(name, "probe answered, CI still responsive");
            return Ok(TickOutcome {
                name: name.to_string(),
                status: HealthStatus::Responsive,
                restarted: false,
            });
        }

        self.status.insert(name.to_string(), HealthStatus::Unresponsive);
        warn!(name, "probe timed out, CI marked unresponsive");

        let auto_restart = self
            .supervisor
            .definitions()
            .get(name)
            .map(|d| d.auto_restart)
            .unwrap_or(false);

        let mut restarted = false;
        if auto_restart {
            info!(name, "restarting unresponsive tool instance");
            if self.supervisor.terminate(name).await.is_ok() {
                match self.supervisor.restart(name).await {
                    Ok(_) => {
                        restarted = true;
                        self.record_activity(name);
                    }
                    Err(e) => warn!(name, error = %e, "auto-restart failed"),
                }
            }
        }

        Ok(TickOutcome {
            name: name.to_string(),
            status: HealthStatus::Unresponsive,
            restarted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_bus::MessageBus;
    use ci_core::{CiEntry, DefinedBy, MessageFormat};
    use ci_ports::{PortAllocator, PortMode, PortRange};
    use tempfile::tempdir;

    async fn setup(dir: &std::path::Path) -> HealthMonitor {
        let registry = Arc::new(RegistryStore::new(dir.join("registry.json"), vec![]));
        let bus = Arc::new(MessageBus::new(dir.join("ci_queues")).unwrap());
        let router = Arc::new(UnifiedRouter::new(registry.clone(), bus));
        let ports = Arc::new(PortAllocator::new(
            PortRange {
                start: 19500,
                end: 19510,
            },
            PortMode::Dynamic,
        ));
        let supervisor = Arc::new(ToolSupervisor::new(
            registry.clone(),
            ports,
            dir.join("custom_tools.json"),
        ));

        registry
            .register(CiEntry::new(
                "echo-ci",
                CiType::Tool,
                MessageFormat::Tool {
                    adapter_kind: "generic".into(),
                },
                DefinedBy::User,
            ))
            .await
            .unwrap();
        registry
            .update("echo-ci", |entry| entry.running = true)
            .await
            .unwrap();

        HealthMonitor::new(registry, router, supervisor)
    }

    #[tokio::test]
    async fn record_activity_keeps_a_ci_out_of_the_silence_window() {
        let dir = tempdir().unwrap();
        let monitor = setup(dir.path()).await;
        monitor.record_activity("echo-ci");

        let outcomes = monitor.tick().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(monitor.status("echo-ci"), Some(HealthStatus::Responsive));
    }

    #[tokio::test]
    async fn silent_ci_with_no_endpoint_is_marked_unresponsive_without_restart() {
        let dir = tempdir().unwrap();
        let monitor = setup(dir.path()).await;
        // no record_activity call: silence is unbounded from the start

        let outcomes = monitor.tick().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "echo-ci");
        assert_eq!(outcomes[0].status, HealthStatus::Unresponsive);
        assert!(!outcomes[0].restarted);
        assert_eq!(monitor.status("echo-ci"), Some(HealthStatus::Unresponsive));
    }
}
