//! Unified Router (spec.md §4.6): resolves a CI name and dispatches a
//! [`Message`] via the transport its registry entry declares.

use std::sync::Arc;
use std::time::Duration;

use ci_bus::MessageBus;
use ci_core::{CiType, CoreError, Message, MessageFormat};
use ci_registry::{ListFilter, RegistryStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{RouterError, RouterResult};
use crate::forward::ForwardTable;
use crate::transport::{self, RouteOutcome};

/// How the target terminal's reply is awaited for `terma_route` traffic
/// (spec.md §4.6: "wait on a reply keyed by `request_id` with a
/// configurable timeout").
const TERMA_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// A single broadcast result: the CI that was addressed and what it returned.
pub struct BroadcastOutcome {
    pub name: String,
    pub result: RouterResult<String>,
}

/// Resolves CI names against the Registry Store and dispatches messages
/// using the transport appropriate to each entry's `message_format`.
pub struct UnifiedRouter {
    registry: Arc<RegistryStore>,
    bus: Arc<MessageBus>,
    forwards: ForwardTable,
    http: reqwest::Client,
}

impl UnifiedRouter {
    #[must_use]
    pub fn new(registry: Arc<RegistryStore>, bus: Arc<MessageBus>) -> Self {
        Self {
            registry,
            bus,
            forwards: ForwardTable::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Buffered send: waits for a single response chunk (spec.md §4.6 steps 1-5).
    pub async fn send(&self, to: &str, mut message: Message) -> RouterResult<String> {
        let entry = self
            .registry
            .get(to)
            .ok_or_else(|| CoreError::UnknownCi(to.to_string()))?;

        self.prepend_next_prompt(to, &mut message).await?;

        let response = match self.dispatch(&entry.message_format, &entry.endpoint, &message, false).await? {
            RouteOutcome::Buffered(chunk) => chunk,
            RouteOutcome::Stream(_) => return Err(RouterError::EmptyResponse),
        };

        self.after_dispatch(to, &message, &response).await?;
        Ok(response)
    }

    /// Streaming send: returns a channel of chunks relayed as they arrive;
    /// callers (the MCP server) frame these as SSE `data:` lines and append
    /// a terminating `done` chunk of their own once the channel closes.
    pub async fn send_stream(
        &self,
        to: &str,
        mut message: Message,
    ) -> RouterResult<mpsc::Receiver<String>> {
        let entry = self
            .registry
            .get(to)
            .ok_or_else(|| CoreError::UnknownCi(to.to_string()))?;

        self.prepend_next_prompt(to, &mut message).await?;

        match self.dispatch(&entry.message_format, &entry.endpoint, &message, true).await? {
            RouteOutcome::Stream(rx) => Ok(rx),
            RouteOutcome::Buffered(chunk) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.send(chunk).await;
                Ok(rx)
            }
        }
    }

    async fn prepend_next_prompt(&self, to: &str, message: &mut Message) -> RouterResult<()> {
        let consumed = self.registry.consume_next(to).await?;
        if consumed.is_empty() {
            return Ok(());
        }
        let mut prefix = String::new();
        for prompt in &consumed {
            prefix.push_str(&prompt.content);
            prefix.push('\n');
        }
        message.content = format!("{prefix}{}", message.content);
        Ok(())
    }

    async fn dispatch(
        &self,
        format: &MessageFormat,
        endpoint: &Option<String>,
        message: &Message,
        stream: bool,
    ) -> RouterResult<RouteOutcome> {
        match format {
            MessageFormat::RhetorSocket | MessageFormat::Tool { .. } => {
                let addr = endpoint
                    .clone()
                    .ok_or_else(|| CoreError::Invalid(format!("{} has no endpoint", message.to)))?;
                transport::send_framed_tcp(&addr, message, stream).await
            }
            MessageFormat::JsonSimple => {
                let endpoint = endpoint
                    .clone()
                    .ok_or_else(|| CoreError::Invalid(format!("{} has no endpoint", message.to)))?;
                let body = transport::send_json_simple(&self.http, &endpoint, message).await?;
                Ok(RouteOutcome::Buffered(body))
            }
            MessageFormat::TermaRoute => self.dispatch_terma_route(message, stream).await,
        }
    }

    async fn dispatch_terma_route(
        &self,
        message: &Message,
        stream: bool,
    ) -> Result<RouteOutcome, RouterError> {
        self.bus.send(&message.to, message).await?;

        if !stream {
            match self
                .bus
                .receive(&message.to, TERMA_REPLY_TIMEOUT)
                .await?
            {
                Some(reply) => return Ok(RouteOutcome::Buffered(reply.content)),
                None => {
                    return Err(RouterError::Core(CoreError::Timeout(
                        TERMA_REPLY_TIMEOUT.as_millis() as u64,
                    )))
                }
            }
        }

        // Streaming terma_route callers get one chunk per bus reply until a
        // receive times out; the terminal's own close of the conversation is
        // signalled by simply stopping replies.
        let (tx, rx) = mpsc::channel(64);
        let bus = self.bus.clone();
        let to = message.to.clone();
        tokio::spawn(async move {
            loop {
                match bus.receive(&to, TERMA_REPLY_TIMEOUT).await {
                    Ok(Some(reply)) => {
                        if tx.send(reply.content).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        });
        Ok(RouteOutcome::Stream(rx))
    }

    async fn after_dispatch(&self, to: &str, message: &Message, response: &str) -> RouterResult<()> {
        if let Some(forward_terminal) = self.forwards.get(to) {
            // Outbound first, then the response, in that order (spec.md §8 S4):
            // a forward observer sees the same sequence the primary caller did.
            let mut outbound = message.clone();
            outbound.from = format!("observed:{to}");
            outbound.to = forward_terminal.clone();
            if let Err(e) = self.bus.send(&forward_terminal, &outbound).await {
                warn!(to, forward_terminal, error = %e, "failed to deliver forwarded outbound traffic");
            }

            let observed_response =
                Message::chat(format!("observed:{to}"), forward_terminal.clone(), response);
            if let Err(e) = self.bus.send(&forward_terminal, &observed_response).await {
                warn!(to, forward_terminal, error = %e, "failed to deliver forwarded response");
            }
        }

        self.registry
            .set_context(
                to,
                ci_core::ContextPatch {
                    last_output: Some(response.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Fan a message out to every CI matching the eligible-type filter
    /// (default: all `greek` and `terminal` entries), spec.md §4.6.
    pub async fn broadcast(&self, message: Message) -> Vec<BroadcastOutcome> {
        let greek = self.registry.list(&ListFilter {
            ci_type: Some(CiType::Greek),
            defined_by: None,
            include_hidden: false,
        });
        let terminal = self.registry.list(&ListFilter {
            ci_type: Some(CiType::Terminal),
            defined_by: None,
            include_hidden: false,
        });

        let mut outcomes = Vec::with_capacity(greek.len() + terminal.len());
        for entry in greek.into_iter().chain(terminal) {
            let mut per_target = message.clone();
            per_target.to = entry.name.clone();
            let result = self.send(&entry.name, per_target).await;
            outcomes.push(BroadcastOutcome {
                name: entry.name,
                result,
            });
        }
        outcomes
    }

    /// Forward a cancellation for `request_id` along the same transport a
    /// streaming caller's original message used (spec.md §4.6 "Cancellation").
    pub async fn cancel(&self, to: &str, request_id: uuid::Uuid) -> RouterResult<()> {
        let entry = self
            .registry
            .get(to)
            .ok_or_else(|| CoreError::UnknownCi(to.to_string()))?;
        let message = Message::cancel("system", to, request_id);

        match &entry.message_format {
            MessageFormat::TermaRoute => {
                self.bus.send(to, &message).await?;
            }
            _ => {
                let _ = self.dispatch(&entry.message_format, &entry.endpoint, &message, false).await;
            }
        }
        debug!(to, %request_id, "cancellation forwarded");
        Ok(())
    }

    pub fn add_forward(&self, from: &str, terminal: &str) {
        self.forwards.add(from, terminal);
    }

    pub fn remove_forward(&self, from: &str) -> RouterResult<()> {
        if self.forwards.remove(from) {
            Ok(())
        } else {
            Err(RouterError::NoSuchForward(from.to_string()))
        }
    }

    #[must_use]
    pub fn list_forwards(&self) -> Vec<(String, String)> {
        self.forwards.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_core::{CiEntry, DefinedBy};
    use tempfile::tempdir;

    fn router(dir: &std::path::Path) -> (UnifiedRouter, Arc<RegistryStore>, Arc<MessageBus>) {
        let registry = Arc::new(RegistryStore::new(dir.join("registry.json"), vec![]));
        let bus = Arc::new(MessageBus::new(dir.join("ci_queues")).unwrap());
        let router = UnifiedRouter::new(registry.clone(), bus.clone());
        (router, registry, bus)
    }

    #[tokio::test]
    async fn send_to_unknown_ci_is_unknown_ci() {
        let dir = tempdir().unwrap();
        let (router, _registry, _bus) = router(dir.path());
        let err = router
            .send("ghost", Message::chat("cli", "ghost", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknown_ci");
    }

    #[tokio::test]
    async fn terma_route_waits_for_bus_reply_and_updates_last_output() {
        let dir = tempdir().unwrap();
        let (router, registry, bus) = router(dir.path());

        let mut entry = CiEntry::new(
            "main-terminal",
            CiType::Terminal,
            MessageFormat::TermaRoute,
            DefinedBy::System,
        );
        entry.endpoint = None;
        registry.register(entry).await.unwrap();
        bus.create("main-terminal").unwrap();

        let responder_bus = bus.clone();
        tokio::spawn(async move {
            let inbound = responder_bus
                .receive("main-terminal", Duration::from_secs(5))
                .await
                .unwrap()
                .expect("router's message arrives");
            let reply = Message::chat("main-terminal", "main-terminal", format!("echo: {}", inbound.content));
            responder_bus.send("main-terminal", &reply).await.unwrap();
        });

        let response = router
            .send("main-terminal", Message::chat("cli", "main-terminal", "hello"))
            .await
            .expect("terma_route round trip succeeds");
        assert_eq!(response, "echo: hello");

        let ctx = registry.get_context("main-terminal").expect("context exists");
        assert_eq!(ctx.last_output, "echo: hello");
    }

    #[tokio::test]
    async fn add_list_remove_forward_round_trips() {
        let dir = tempdir().unwrap();
        let (router, _registry, _bus) = router(dir.path());

        router.add_forward("numa", "main-terminal");
        assert_eq!(router.list_forwards(), vec![("numa".to_string(), "main-terminal".to_string())]);

        router.remove_forward("numa").unwrap();
        assert!(router.list_forwards().is_empty());

        let err = router.remove_forward("numa").unwrap_err();
        assert_eq!(err.code(), "no_such_forward");
    }

    #[tokio::test]
    async fn broadcast_skips_tool_and_project_entries() {
        let dir = tempdir().unwrap();
        let (router, registry, _bus) = router(dir.path());

        registry
            .register(CiEntry::new(
                "some-tool",
                CiType::Tool,
                MessageFormat::Tool {
                    adapter_kind: "generic".into(),
                },
                DefinedBy::User,
            ))
            .await
            .unwrap();

        let outcomes = router.broadcast(Message::chat("system", "*", "ping")).await;
        assert!(outcomes.is_empty());
    }
}
