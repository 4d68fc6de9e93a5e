//! Lifecycle Coordinator (spec.md §4.9): orders component startup and,
//! especially, ordered shutdown of platform-wide AIs relative to ordinary
//! ones and the core itself.

use std::sync::Arc;
use std::time::Duration;

use ci_bus::MessageBus;
use ci_health::HealthMonitor;
use ci_ports::PortAllocator;
use ci_registry::RegistryStore;
use ci_router::UnifiedRouter;
use ci_supervisor::ToolSupervisor;

use crate::config::Config;
use crate::platform_ai;

/// Every handle the coordinator needs in order to sequence shutdown.
/// Built once by [`start`] and handed to [`shutdown`] (or to the MCP
/// server, which owns the HTTP lifetime).
pub struct Core {
    pub registry: Arc<RegistryStore>,
    pub ports: Arc<PortAllocator>,
    pub bus: Arc<MessageBus>,
    pub router: Arc<UnifiedRouter>,
    pub supervisor: Arc<ToolSupervisor>,
    pub health: Arc<HealthMonitor>,
    /// Platform-wide AI names registered by this coordinator, in the order
    /// they were registered; shutdown walks this list in reverse of
    /// "ordinary AI" teardown, per spec.md §4.9.
    pub platform_wide: Vec<String>,
}

/// Start every leaf-first component in the order spec.md §4.9 requires:
/// Registry Store, Port Allocator, Message Bus, MCP Server (caller wires
/// this up separately since it owns the accept loop), Tool Supervisor.
/// Only once health checks for all component AIs pass does the coordinator
/// register the platform-wide AIs — gated by `REGISTER_AI` (spec.md §6.4).
pub async fn start(config: &Config) -> std::io::Result<Core> {
    std::fs::create_dir_all(&config.root)?;
    std::fs::create_dir_all(config.custom_tools_path().parent().unwrap())?;
    std::fs::create_dir_all(config.logs_dir())?;

    tracing::info!(root = %config.root.display(), "starting Registry Store");
    let registry = Arc::new(RegistryStore::new(config.registry_path(), vec![]));
    registry
        .load()
        .await
        .unwrap_or_else(|e| tracing::warn!(error = %e, "no existing registry, starting empty"));

    tracing::info!(?config.port_mode, ?config.port_range, "starting Port Allocator");
    let ports = Arc::new(PortAllocator::new(config.port_range, config.port_mode));

    tracing::info!(dir = %config.queue_dir().display(), "starting Message Bus");
    let bus = Arc::new(MessageBus::new(config.queue_dir()).map_err(to_io_error)?);

    let router = Arc::new(UnifiedRouter::new(registry.clone(), bus.clone()));

    tracing::info!("starting Tool Supervisor");
    let supervisor = Arc::new(ToolSupervisor::with_adapters_dir(
        registry.clone(),
        ports.clone(),
        config.custom_tools_path(),
        Some(config.adapters_dir()),
    ));
    supervisor.reconcile_startup().await;

    let health = Arc::new(HealthMonitor::new(registry.clone(), router.clone(), supervisor.clone()));

    // "Only after health checks for all component AIs pass does the
    // coordinator launch platform-wide AIs" — the component AIs here are
    // the core's own subsystems, which are live the moment the above
    // constructors return, so the gate is simply `register_ai`.
    let platform_wide = if config.register_ai {
        tracing::info!("REGISTER_AI set: registering platform-wide AIs");
        platform_ai::register_platform_wide(&registry).await
    } else {
        tracing::info!("REGISTER_AI unset: Tool Supervisor running without AI processes");
        Vec::new()
    };

    Ok(Core {
        registry,
        ports,
        bus,
        router,
        supervisor,
        health,
        platform_wide,
    })
}

/// Strictly the reverse of startup: platform-wide AIs first, then ordinary
/// tool instances, then the core itself. A failure at any step is logged
/// but does not prevent subsequent steps (spec.md §4.9 "best-effort
/// teardown").
pub async fn shutdown(core: &Core) {
    for name in &core.platform_wide {
        tracing::info!(name, "hiding platform-wide AI");
        // System entries are hidden, never deleted (spec.md §3.1); `remove`
        // would just fail `system_entry_protected` here.
        if let Err(e) = core.registry.hide(name).await {
            tracing::warn!(name, error = %e, "failed to hide platform-wide AI entry during shutdown");
        }
    }

    for instance in core.supervisor.instances() {
        tracing::info!(name = %instance.name, "terminating tool instance");
        if let Err(e) = core.supervisor.terminate(&instance.name).await {
            tracing::warn!(name = %instance.name, error = %e, "failed to terminate tool instance during shutdown");
        }
    }

    tracing::info!("persisting registry before exit");
    if let Err(e) = core.registry.save().await {
        tracing::warn!(error = %e, "final registry save failed");
    }
}

/// Drive the health monitor's periodic tick loop until `shutdown` resolves
/// (spec.md §4.7 "one monitor tick per interval").
pub async fn run_health_loop(health: Arc<HealthMonitor>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match health.tick().await {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            tracing::debug!(?outcome, "health tick outcome");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "health tick failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn to_io_error(e: ci_core::CoreError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}
