//! `ci-orchestratord`: the process that hosts the CI Orchestration Core.
//!
//! Wires the Registry Store, Port Allocator, Message Bus, Tool Supervisor,
//! Health Monitor and MCP Server together in the startup order spec.md
//! §4.9 requires, then serves `/api/mcp/v2` until it receives a shutdown
//! signal, at which point it tears everything down in reverse order.

use std::time::Duration;

use ci_mcp::{AppState, CorsPolicy};
use ci_orchestrator::{lifecycle, Config};
use tracing_subscriber::EnvFilter;

fn init_tracing(logs_dir: &std::path::Path) {
    let file_appender = tracing_appender::rolling::daily(logs_dir, "mcp");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive the process, and this
    // binary has no earlier point to stash it without threading it through
    // every call site.
    std::mem::forget(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .json()
        .init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::from_env();
    std::fs::create_dir_all(config.logs_dir())?;
    init_tracing(&config.logs_dir());

    tracing::info!(?config.mcp_bind, root = %config.root.display(), "ci-orchestratord starting");

    let core = lifecycle::start(&config).await?;

    let (health_shutdown_tx, health_shutdown_rx) = tokio::sync::watch::channel(false);
    let health_task = tokio::spawn(lifecycle::run_health_loop(
        core.health.clone(),
        ci_health::DEFAULT_TICK_INTERVAL,
        health_shutdown_rx,
    ));

    let state = AppState {
        registry: core.registry.clone(),
        router: core.router.clone(),
        supervisor: core.supervisor.clone(),
        health: core.health.clone(),
    };

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    let serve_result = ci_mcp::serve(config.mcp_bind, state, CorsPolicy::default(), shutdown_signal).await;

    let _ = health_shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), health_task).await;

    lifecycle::shutdown(&core).await;
    tracing::info!("ci-orchestratord stopped");

    serve_result
}
