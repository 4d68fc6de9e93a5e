//! Tool Supervisor (spec.md §4.5): owns the lifecycle of tool-class CI
//! instances — launching, health-checking, auto-restarting and terminating
//! the child processes behind a Socket Bridge.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ci_bridge::{AdapterRegistry, BridgeMode, SocketBridge};
use ci_core::{AdapterKind, CiEntry, CiType, DefinedBy, MessageFormat, ToolInstance};
use ci_ports::PortAllocator;
use ci_registry::RegistryStore;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::definition::{self, DefinitionsFile, ToolDefinition};
use crate::error::{SupervisorError, SupervisorResult};
use crate::restart::RestartState;

/// A live tool instance: its bridge handle plus the metadata surfaced to
/// callers through [`ToolSupervisor::status`] and [`ToolSupervisor::instances`].
struct RunningInstance {
    bridge: Arc<AsyncMutex<SocketBridge>>,
    instance: ToolInstance,
}

/// Owns the tool definitions file and every currently-running tool process.
pub struct ToolSupervisor {
    registry: Arc<RegistryStore>,
    ports: Arc<PortAllocator>,
    adapters: AdapterRegistry,
    definitions_path: PathBuf,
    definitions: DashMap<String, ToolDefinition>,
    running: DashMap<String, RunningInstance>,
    restart_state: DashMap<String, RestartState>,
}

impl ToolSupervisor {
    /// Load persisted tool definitions from `definitions_path`, without
    /// launching anything; callers invoke [`Self::reconcile_startup`]
    /// separately once the registry and port allocator are themselves ready
    /// (spec.md §4.9 startup ordering: Tool Supervisor starts last).
    #[must_use]
    pub fn new(
        registry: Arc<RegistryStore>,
        ports: Arc<PortAllocator>,
        definitions_path: PathBuf,
    ) -> Self {
        Self::with_adapters_dir(registry, ports, definitions_path, None)
    }

    /// Same as [`Self::new`], additionally scanning `adapters_dir` (if
    /// given) for drop-in JSON adapter manifests (spec.md §9) on top of
    /// the two built-ins.
    #[must_use]
    pub fn with_adapters_dir(
        registry: Arc<RegistryStore>,
        ports: Arc<PortAllocator>,
        definitions_path: PathBuf,
        adapters_dir: Option<PathBuf>,
    ) -> Self {
        let file: DefinitionsFile = definition::load(&definitions_path);
        let definitions = DashMap::new();
        for (name, def) in file.tools {
            definitions.insert(name, def);
        }

        let mut adapters = AdapterRegistry::with_builtins();
        if let Some(dir) = adapters_dir {
            adapters.load_dir(&dir);
        }

        Self {
            registry,
            ports,
            adapters,
            definitions_path,
            definitions,
            running: DashMap::new(),
            restart_state: DashMap::new(),
        }
    }

    /// Persist `define()`/`undefine()` mutations of the on-disk definitions
    /// file (spec.md §4.5 "Persistence").
    fn save_definitions(&self) -> SupervisorResult<()> {
        let mut file = DefinitionsFile::default();
        for entry in self.definitions.iter() {
            file.tools.insert(entry.key().clone(), entry.value().clone());
        }
        definition::save(&self.definitions_path, &file)
            .map_err(|e| SupervisorError::Invalid(format!("failed to persist definitions: {e}")))
    }

    /// Register a new tool definition (spec.md §6.1 `aish tools define`).
    /// Does not launch the tool; a subsequent `launch()` call does that.
    pub fn define(&self, definition: ToolDefinition) -> SupervisorResult<()> {
        if definition.name.trim().is_empty() {
            return Err(SupervisorError::Invalid("tool name must not be empty".into()));
        }
        if self.adapters.get(&definition.adapter_kind).is_none() {
            return Err(SupervisorError::Invalid(format!(
                "unknown adapter kind: {}",
                definition.adapter_kind
            )));
        }
        self.definitions.insert(definition.name.clone(), definition);
        self.save_definitions()
    }

    /// Remove a tool definition. Running instances are left alone; callers
    /// should `terminate()` first if they want a clean stop.
    pub fn undefine(&self, name: &str) -> SupervisorResult<()> {
        if self.definitions.remove(name).is_none() {
            return Err(SupervisorError::NotFound(name.to_string()));
        }
        self.save_definitions()
    }

    /// Launch a tool instance, following the eight-step algorithm in
    /// spec.md §4.5:
    /// 1. Resolve the tool definition.
    /// 2. Verify executable existence and execute permission.
    /// 3. Acquire a port lease.
    /// 4. Select an adapter by kind.
    /// 5. Start a Socket Bridge.
    /// 6. Register (or update) the Registry entry.
    /// 7. Perform the configured health check.
    /// 8. Return the port.
    pub async fn launch(&self, name: &str) -> SupervisorResult<u16> {
        if self.running.contains_key(name) {
            return Err(SupervisorError::Core(ci_core::CoreError::AlreadyRunning(
                name.to_string(),
            )));
        }

        let definition = self
            .definitions
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        verify_executable(&definition.executable)?;

        let adapter = self
            .adapters
            .get(&definition.adapter_kind)
            .ok_or_else(|| {
                SupervisorError::Invalid(format!("unknown adapter kind: {}", definition.adapter_kind))
            })?
            .clone();

        let port = self.ports.acquire(name, definition.port_hint).await?;

        let delimiter = if definition.delimiter.is_empty() {
            adapter.default_delimiter.clone()
        } else {
            definition.effective_delimiter()
        };

        let os_injection = definition.os_injection && adapter.os_injection_allowed;

        let bridge = match SocketBridge::start(
            adapter.mode,
            &definition.executable,
            &definition.launch_args,
            &definition.env,
            port,
            delimiter.clone(),
            os_injection,
        )
        .await
        {
            Ok(bridge) => bridge,
            Err(e) => {
                let _ = self.ports.release(port, name);
                return Err(SupervisorError::Bridge(e));
            }
        };

        let adapter_kind = match adapter.mode {
            BridgeMode::Pty => AdapterKind::ClaudeCode,
            BridgeMode::Stdio => AdapterKind::Generic,
        };

        let instance = ToolInstance {
            name: name.to_string(),
            tool_name: name.to_string(),
            pid: bridge.pid(),
            port,
            session_id: Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
            adapter_kind,
            delimiter,
            os_injection,
        };

        self.upsert_registry_entry(&definition, &instance, port).await?;

        if let Err(e) = self.run_health_check(&definition, port).await {
            warn!(name, error = %e, "initial health check failed, terminating launch attempt");
            let mut bridge = bridge;
            let _ = bridge.stop().await;
            let _ = self.ports.release(port, name);
            let _ = self
                .registry
                .update(name, |entry| entry.running = false)
                .await;
            return Err(SupervisorError::HealthCheckFailed {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }

        self.running.insert(
            name.to_string(),
            RunningInstance {
                bridge: Arc::new(AsyncMutex::new(bridge)),
                instance,
            },
        );
        self.restart_state.entry(name.to_string()).or_default().reset();

        info!(name, port, "tool launched");
        Ok(port)
    }

    async fn upsert_registry_entry(
        &self,
        definition: &ToolDefinition,
        instance: &ToolInstance,
        port: u16,
    ) -> SupervisorResult<()> {
        if self.registry.get(&definition.name).is_some() {
            self.registry
                .update(&definition.name, |entry| {
                    entry.pid = Some(instance.pid);
                    entry.running = true;
                    entry.endpoint = Some(format!("127.0.0.1:{port}"));
                })
                .await?;
        } else {
            let mut entry = CiEntry::new(
                definition.name.clone(),
                CiType::Tool,
                MessageFormat::Tool {
                    adapter_kind: definition.adapter_kind.clone(),
                },
                DefinedBy::User,
            );
            entry.description = format!("{} tool instance", definition.adapter_kind);
            entry.capabilities = definition.capabilities.clone();
            entry.executable = Some(definition.executable.clone());
            entry.launch_args = definition.launch_args.clone();
            entry.env = definition.env.clone();
            entry.health_check = definition.health_check.clone();
            entry.pid = Some(instance.pid);
            entry.running = true;
            entry.endpoint = Some(format!("127.0.0.1:{port}"));
            self.registry.register(entry).await?;
        }
        Ok(())
    }

    /// Probe strategy selected by `health_check`: `none` always passes,
    /// `ping`/`status`/`version` confirm the bridge accepted the
    /// connection and the child is still alive (spec.md §4.5 step 7 — the
    /// protocol payload itself is adapter-specific and out of scope here;
    /// liveness is the check this crate can make without a live client).
    async fn run_health_check(&self, definition: &ToolDefinition, port: u16) -> SupervisorResult<()> {
        match definition.health_check.as_str() {
            "none" => Ok(()),
            _ => {
                let addr = format!("127.0.0.1:{port}");
                tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    tokio::net::TcpStream::connect(&addr),
                )
                .await
                .map_err(|_| SupervisorError::HealthCheckFailed {
                    name: definition.name.clone(),
                    reason: "connect timed out".to_string(),
                })?
                .map_err(|e| SupervisorError::HealthCheckFailed {
                    name: definition.name.clone(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }
        }
    }

    /// Stop a running instance: SIGTERM-then-SIGKILL via the bridge, release
    /// its port, and mark the registry entry not-running.
    pub async fn terminate(&self, name: &str) -> SupervisorResult<()> {
        let Some((_, running)) = self.running.remove(name) else {
            return Err(SupervisorError::Core(ci_core::CoreError::NotRunning(
                name.to_string(),
            )));
        };

        let port = running.instance.port;
        running.bridge.lock().await.stop().await?;
        let _ = self.ports.release(port, name);
        self.restart_state.remove(name);

        self.registry
            .update(name, |entry| {
                entry.running = false;
                entry.pid = None;
            })
            .await?;

        info!(name, "tool terminated");
        Ok(())
    }

    /// A point-in-time snapshot of one instance's liveness, for the Health
    /// Monitor and `aish tools status` (spec.md §6.1).
    #[must_use]
    pub fn status(&self, name: &str) -> Option<ToolInstance> {
        self.running.get(name).map(|r| r.instance.clone())
    }

    #[must_use]
    pub fn instances(&self) -> Vec<ToolInstance> {
        self.running.iter().map(|r| r.instance.clone()).collect()
    }

    #[must_use]
    pub fn definitions(&self) -> BTreeMap<String, ToolDefinition> {
        self.definitions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Union of every running instance's advertised capabilities, for the
    /// discovery endpoints (spec.md §6.2 `/tools/capabilities`).
    #[must_use]
    pub fn capabilities(&self) -> std::collections::BTreeSet<String> {
        let mut caps = std::collections::BTreeSet::new();
        for def in self.definitions.iter() {
            caps.extend(def.value().capabilities.iter().cloned());
        }
        caps
    }

    #[must_use]
    pub fn is_alive(&self, name: &str) -> bool {
        self.running.get(name).is_some_and(|r| bridge_is_alive(&r.bridge))
    }

    /// Restart a dead instance, honoring the exponential backoff and
    /// five-attempts-per-five-minutes cap (spec.md §4.5 "Failure semantics").
    /// Intended to be driven by the Health Monitor, not called directly by
    /// CLI commands.
    pub async fn restart(&self, name: &str) -> SupervisorResult<u16> {
        let definition = self
            .definitions
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        if !definition.auto_restart {
            return Err(SupervisorError::Invalid(format!(
                "auto_restart disabled for {name}"
            )));
        }

        let allowed = self
            .restart_state
            .entry(name.to_string())
            .or_default()
            .record_attempt();
        if !allowed {
            warn!(name, "restart attempts exhausted, abandoning instance");
            return Err(SupervisorError::HealthCheckFailed {
                name: name.to_string(),
                reason: "exceeded five restart attempts in five minutes".to_string(),
            });
        }

        let delay = self
            .restart_state
            .get(name)
            .map(|s| s.next_delay())
            .unwrap_or_default();
        debug!(name, ?delay, "restarting tool after backoff");
        tokio::time::sleep(delay).await;

        if self.running.remove(name).is_some() {
            // stale handle from a crashed process; the port lease is gone
            // along with it, nothing further to clean up here.
        }

        self.launch(name).await
    }

    /// Rebuild in-memory state (port leases, running map) by walking
    /// registry entries whose `running` flag survived a previous process
    /// lifetime (spec.md §4.9 startup: the supervisor starts last and does
    /// not itself re-spawn processes it did not start — it only adopts the
    /// bookkeeping for instances a caller confirms are still alive via a
    /// successful health check).
    pub async fn reconcile_startup(&self) {
        let tool_entries = self.registry.list(&ci_registry::ListFilter {
            ci_type: Some(CiType::Tool),
            defined_by: None,
            include_hidden: false,
        });

        for entry in tool_entries {
            if !entry.running {
                continue;
            }
            let Some(definition) = self.definitions.get(&entry.name).map(|d| d.value().clone())
            else {
                continue;
            };
            let Some(port) = entry
                .endpoint
                .as_ref()
                .and_then(|e| e.rsplit(':').next())
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };

            if self.run_health_check(&definition, port).await.is_ok() {
                self.ports.adopt(port, &entry.name);
                debug!(name = entry.name, port, "adopted surviving tool instance");
            } else {
                let _ = self
                    .registry
                    .update(&entry.name, |e| {
                        e.running = false;
                        e.pid = None;
                    })
                    .await;
            }
        }
    }
}

/// `SocketBridge::is_alive` needs the async mutex held briefly; this helper
/// keeps call sites terse.
fn bridge_is_alive(bridge: &Arc<AsyncMutex<SocketBridge>>) -> bool {
    bridge.try_lock().map(|b| b.is_alive()).unwrap_or(true)
}

fn verify_executable(path: &str) -> SupervisorResult<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| SupervisorError::ExecutableUnavailable(path.to_string()))?;
    if !metadata.is_file() {
        return Err(SupervisorError::ExecutableUnavailable(path.to_string()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SupervisorError::ExecutableUnavailable(path.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_ports::{PortMode, PortRange};
    use tempfile::tempdir;

    fn supervisor(dir: &std::path::Path) -> ToolSupervisor {
        let registry = Arc::new(RegistryStore::new(dir.join("registry.json"), vec![]));
        let ports = Arc::new(PortAllocator::new(
            PortRange {
                start: 19400,
                end: 19420,
            },
            PortMode::Dynamic,
        ));
        ToolSupervisor::new(registry, ports, dir.join("custom_tools.json"))
    }

    fn echo_definition() -> ToolDefinition {
        ToolDefinition {
            name: "echo-ci".into(),
            adapter_kind: "generic".into(),
            executable: "/bin/cat".into(),
            launch_args: vec![],
            env: BTreeMap::new(),
            port_hint: None,
            capabilities: Default::default(),
            health_check: "none".into(),
            delimiter: String::new(),
            os_injection: false,
            auto_restart: true,
        }
    }

    #[tokio::test]
    async fn define_persists_and_is_listable() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        sup.define(echo_definition()).unwrap();

        assert!(sup.definitions().contains_key("echo-ci"));
        let reloaded = definition::load(&dir.path().join("custom_tools.json"));
        assert!(reloaded.tools.contains_key("echo-ci"));
    }

    #[tokio::test]
    async fn with_adapters_dir_picks_up_a_dropped_in_manifest() {
        let dir = tempdir().unwrap();
        let adapters_dir = dir.path().join("adapters");
        std::fs::create_dir_all(&adapters_dir).unwrap();
        std::fs::write(
            adapters_dir.join("aider.json"),
            r#"{"kind":"aider","mode":"stdio","default_delimiter":[10],"cancel_sequence":[27],"os_injection_allowed":false}"#,
        )
        .unwrap();

        let registry = Arc::new(RegistryStore::new(dir.path().join("registry.json"), vec![]));
        let ports = Arc::new(PortAllocator::new(
            PortRange {
                start: 19430,
                end: 19440,
            },
            PortMode::Dynamic,
        ));
        let sup = ToolSupervisor::with_adapters_dir(
            registry,
            ports,
            dir.path().join("custom_tools.json"),
            Some(adapters_dir),
        );

        let mut def = echo_definition();
        def.adapter_kind = "aider".into();
        sup.define(def).unwrap();
        assert!(sup.definitions().contains_key("echo-ci"));
    }

    #[tokio::test]
    async fn define_rejects_unknown_adapter_kind() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut def = echo_definition();
        def.adapter_kind = "no-such-adapter".into();

        let err = sup.define(def).unwrap_err();
        assert_eq!(err.code(), "invalid");
    }

    #[tokio::test]
    async fn launch_unknown_tool_is_not_found() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        let err = sup.launch("no-such-tool").await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn launch_missing_executable_reports_unavailable() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut def = echo_definition();
        def.executable = "/no/such/binary".into();
        sup.define(def).unwrap();

        let err = sup.launch("echo-ci").await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn launch_then_terminate_round_trips() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        sup.define(echo_definition()).unwrap();

        let port = sup.launch("echo-ci").await.expect("launch succeeds");
        assert!(sup.status("echo-ci").is_some());
        assert_eq!(sup.instances().len(), 1);

        sup.terminate("echo-ci").await.expect("terminate succeeds");
        assert!(sup.status("echo-ci").is_none());
        let _ = port;
    }

    #[tokio::test]
    async fn double_launch_is_already_running() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        sup.define(echo_definition()).unwrap();
        sup.launch("echo-ci").await.expect("first launch succeeds");

        let err = sup.launch("echo-ci").await.unwrap_err();
        assert_eq!(err.code(), "already_running");

        sup.terminate("echo-ci").await.unwrap();
    }

    #[tokio::test]
    async fn terminate_unknown_tool_is_not_running() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path());
        let err = sup.terminate("echo-ci").await.unwrap_err();
        assert_eq!(err.code(), "not_running");
    }
}
