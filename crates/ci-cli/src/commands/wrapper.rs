//! `aish ci-terminal` / `aish ci-tool` (spec.md §6.1, §4.4): wrap an
//! arbitrary command in a Socket Bridge and register it in the shared
//! registry as a tool-class CI reachable at `127.0.0.1:<port>`, for the
//! lifetime of this process.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ci_bridge::{parse_delimiter, BridgeMode, SocketBridge};
use ci_core::{CiEntry, CiType, DefinedBy, MessageFormat};
use ci_orchestrator::Config;
use ci_ports::PortAllocator;
use ci_registry::RegistryStore;
use tracing::{info, warn};

use crate::cli::WrapperArgs;
use crate::error::{CliError, CliResult};

/// Poll interval for detecting an unassisted child exit while waiting on
/// Ctrl-C (spec.md §4.4 `is_alive`).
const LIVENESS_POLL: Duration = Duration::from_millis(500);

pub async fn run(args: WrapperArgs, mode: BridgeMode) -> CliResult<()> {
    let (executable, launch_args) = args
        .cmd
        .split_first()
        .ok_or_else(|| CliError::Usage("missing command to wrap".to_string()))?;
    let launch_args = launch_args.to_vec();

    let config = Config::from_env();
    let registry = Arc::new(RegistryStore::new(config.registry_path(), vec![]));
    let ports = PortAllocator::new(config.port_range, config.port_mode);

    let port = ports
        .acquire(&args.name, None)
        .await
        .map_err(|e| CliError::Transport(e.to_string()))?;

    let delimiter = args
        .delimiter
        .map(|spec| parse_delimiter(&spec))
        .unwrap_or_else(|| vec![b'\n']);

    let mut bridge = SocketBridge::start(
        mode,
        executable,
        &launch_args,
        &BTreeMap::new(),
        port,
        delimiter,
        args.os_injection && mode == BridgeMode::Pty,
    )
    .await
    .map_err(|e| CliError::Transport(e.to_string()))?;

    let adapter_kind = match mode {
        BridgeMode::Pty => "claude-code",
        BridgeMode::Stdio => "generic",
    };

    let mut entry = CiEntry::new(
        args.name.clone(),
        CiType::Tool,
        MessageFormat::Tool {
            adapter_kind: adapter_kind.to_string(),
        },
        DefinedBy::User,
    );
    entry.endpoint = Some(format!("http://127.0.0.1:{port}"));
    entry.executable = Some(executable.clone());
    entry.launch_args = launch_args;
    entry.pid = Some(bridge.pid());
    entry.running = true;

    if let Err(e) = registry.register(entry).await {
        // Already registered by an earlier run under this name: update it
        // in place rather than refusing to wrap the command.
        registry
            .update(&args.name, |e| {
                e.endpoint = Some(format!("http://127.0.0.1:{port}"));
                e.pid = Some(bridge.pid());
                e.running = true;
            })
            .await
            .map_err(|update_err| CliError::Transport(format!("{e}; {update_err}")))?;
    }

    info!(name = %args.name, port, pid = bridge.pid(), "wrapper bridge listening");
    eprintln!(
        "{} listening on 127.0.0.1:{port} (pid {})",
        args.name,
        bridge.pid()
    );

    wait_for_exit(&bridge).await;

    if let Err(e) = bridge.stop().await {
        warn!(error = %e, "error stopping wrapped child");
    }
    ports.release(port, &args.name).ok();
    let _ = registry
        .update(&args.name, |e| {
            e.running = false;
            e.pid = None;
        })
        .await;

    Ok(())
}

async fn wait_for_exit(bridge: &SocketBridge) {
    let mut ticker = tokio::time::interval(LIVENESS_POLL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, stopping wrapped child");
                return;
            }
            _ = ticker.tick() => {
                if !bridge.is_alive() {
                    info!("wrapped child exited on its own");
                    return;
                }
            }
        }
    }
}
