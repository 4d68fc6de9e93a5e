//! End-to-end scenarios from spec.md §8, exercised against the real
//! Registry Store, Port Allocator, Tool Supervisor, and Unified Router
//! wired together the way `ci-orchestratord` wires them, minus the HTTP
//! layer (covered separately by `ci-mcp`'s own router tests).

use std::sync::Arc;

use ci_bus::MessageBus;
use ci_core::{ContextPatch, Message, PromptMessage, Role};
use ci_ports::{PortAllocator, PortMode, PortRange};
use ci_registry::RegistryStore;
use ci_router::UnifiedRouter;
use ci_supervisor::{SupervisorError, ToolDefinition, ToolSupervisor};
use tempfile::tempdir;

fn test_port_range() -> PortRange {
    // Disjoint from the default tool range and other test modules so
    // parallel test binaries never fight over the same ports.
    PortRange {
        start: 19700,
        end: 19703,
    }
}

struct Stack {
    registry: Arc<RegistryStore>,
    supervisor: Arc<ToolSupervisor>,
    router: Arc<UnifiedRouter>,
    bus: Arc<MessageBus>,
    _dir: tempfile::TempDir,
}

fn build_stack() -> Stack {
    let dir = tempdir().unwrap();
    let registry = Arc::new(RegistryStore::new(dir.path().join("registry.json"), vec![]));
    let bus = Arc::new(MessageBus::new(dir.path().join("ci_queues")).unwrap());
    let ports = Arc::new(PortAllocator::new(test_port_range(), PortMode::Dynamic));
    let supervisor = Arc::new(ToolSupervisor::new(
        registry.clone(),
        ports,
        dir.path().join("custom_tools.json"),
    ));
    let router = Arc::new(UnifiedRouter::new(registry.clone(), bus.clone()));
    Stack {
        registry,
        supervisor,
        router,
        bus,
        _dir: dir,
    }
}

/// S1 — Define, launch, send, terminate (spec.md §8).
#[tokio::test]
async fn s1_define_launch_send_terminate() {
    let stack = build_stack();

    stack
        .supervisor
        .define(ToolDefinition {
            name: "echo-ci".to_string(),
            adapter_kind: "generic".to_string(),
            executable: "/bin/cat".to_string(),
            launch_args: vec![],
            env: Default::default(),
            port_hint: None,
            capabilities: Default::default(),
            health_check: "none".to_string(),
            delimiter: String::new(),
            os_injection: false,
            auto_restart: true,
        })
        .unwrap();

    let port = stack.supervisor.launch("echo-ci").await.unwrap();
    assert!(port >= test_port_range().start && port <= test_port_range().end);

    // Give the freshly-spawned /bin/cat a moment to reach accept().
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut message = Message::chat("cli", "echo-ci", "hello\n");
    message.execute = true;
    message.delimiter = Some("\n".to_string());

    let response = stack.router.send("echo-ci", message).await.unwrap();
    assert_eq!(response, "hello");

    let context = stack.registry.get_context("echo-ci").unwrap_or_default();
    assert_eq!(context.last_output, "hello");

    stack.supervisor.terminate("echo-ci").await.unwrap();
    assert!(stack.supervisor.status("echo-ci").is_none());
}

/// S2 — Staged → next promotion (spec.md §8).
#[tokio::test]
async fn s2_staged_to_next_promotion() {
    let stack = build_stack();
    stack
        .registry
        .register(ci_core::CiEntry::new(
            "numa",
            ci_core::CiType::Greek,
            ci_core::MessageFormat::RhetorSocket,
            ci_core::DefinedBy::System,
        ))
        .await
        .unwrap();

    let staged = vec![PromptMessage {
        role: Role::System,
        content: "focus on performance".to_string(),
    }];
    stack
        .registry
        .set_context(
            "numa",
            ContextPatch {
                last_output: None,
                staged_prompt: Some(staged.clone()),
                next_prompt: None,
            },
        )
        .await
        .unwrap();

    stack.registry.promote_staged("numa").await.unwrap();

    let first = stack.registry.consume_next("numa").await.unwrap();
    assert_eq!(first, staged);

    let second = stack.registry.consume_next("numa").await.unwrap();
    assert!(second.is_empty());
}

/// S6 — Unknown CI (spec.md §8): no context state is written on failure.
#[tokio::test]
async fn s6_unknown_ci_writes_nothing() {
    let stack = build_stack();
    let message = Message::chat("cli", "no-such-ci", "hello");
    let err = stack.router.send("no-such-ci", message).await.unwrap_err();
    assert!(matches!(
        err,
        ci_router::RouterError::Core(ci_core::CoreError::UnknownCi(_))
    ));
    assert!(stack.registry.get_context("no-such-ci").is_none());
}

/// Defining the same name twice is rejected (invariant 1, spec.md §3.2),
/// and launching an undefined tool fails with a structured reason.
#[tokio::test]
async fn launch_of_undefined_tool_fails_not_found() {
    let stack = build_stack();
    let err = stack.supervisor.launch("ghost-tool").await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotFound(_)));
}

/// S3 — Two concurrent launches contend for a port (spec.md §8): with a
/// two-port range, two launches succeed on distinct ports and a third
/// returns `port_unavailable`, never two successes on the same port.
#[tokio::test]
async fn s3_concurrent_launches_contend_for_a_port() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(RegistryStore::new(dir.path().join("registry.json"), vec![]));
    let ports = Arc::new(PortAllocator::new(
        PortRange {
            start: 19710,
            end: 19711,
        },
        PortMode::Dynamic,
    ));
    let supervisor = Arc::new(ToolSupervisor::new(
        registry.clone(),
        ports,
        dir.path().join("custom_tools.json"),
    ));

    for name in ["tool-a", "tool-b", "tool-c"] {
        supervisor
            .define(ToolDefinition {
                name: name.to_string(),
                adapter_kind: "generic".to_string(),
                executable: "/bin/cat".to_string(),
                launch_args: vec![],
                env: Default::default(),
                port_hint: None,
                capabilities: Default::default(),
                health_check: "none".to_string(),
                delimiter: String::new(),
                os_injection: false,
                auto_restart: false,
            })
            .unwrap();
    }

    let (a, b, c) = tokio::join!(
        supervisor.launch("tool-a"),
        supervisor.launch("tool-b"),
        supervisor.launch("tool-c"),
    );

    let ports_used: Vec<u16> = [a, b, c]
        .into_iter()
        .filter_map(std::result::Result::ok)
        .collect();
    assert_eq!(ports_used.len(), 2, "exactly two launches should have gotten a port");
    assert_eq!(
        ports_used.iter().collect::<std::collections::HashSet<_>>().len(),
        2,
        "no two launches may succeed with the same port"
    );
    assert!(ports_used.iter().all(|p| (19710..=19711).contains(p)));
}

/// S4 — Forward traffic (spec.md §8): a forwarded CI's primary transport
/// still carries the response, and the forward terminal separately
/// observes the outbound message followed by the response, in order.
#[tokio::test]
async fn s4_forward_traffic_observes_outbound_then_response() {
    let stack = build_stack();

    stack
        .supervisor
        .define(ToolDefinition {
            name: "echo-ci".to_string(),
            adapter_kind: "generic".to_string(),
            executable: "/bin/cat".to_string(),
            launch_args: vec![],
            env: Default::default(),
            port_hint: None,
            capabilities: Default::default(),
            health_check: "none".to_string(),
            delimiter: String::new(),
            os_injection: false,
            auto_restart: false,
        })
        .unwrap();
    stack.supervisor.launch("echo-ci").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    stack.bus.create("alice").unwrap();
    stack.router.add_forward("echo-ci", "alice");

    let mut message = Message::chat("cli", "echo-ci", "hi\n");
    message.execute = true;
    message.delimiter = Some("\n".to_string());
    let response = stack.router.send("echo-ci", message).await.unwrap();
    assert_eq!(response, "hi");

    let first = stack
        .bus
        .receive("alice", std::time::Duration::from_secs(1))
        .await
        .unwrap()
        .expect("outbound observation");
    assert_eq!(first.from, "observed:echo-ci");
    assert_eq!(first.content, "hi\n");

    let second = stack
        .bus
        .receive("alice", std::time::Duration::from_secs(1))
        .await
        .unwrap()
        .expect("response observation");
    assert_eq!(second.content, "hi");
}
