//! Message Bus (spec.md §4.3).
//!
//! Each CI owns a named, bounded, priority-ordered queue. Messages travel
//! over a datagram-oriented Unix-domain socket placed under a configured
//! directory (the filename encodes the CI name), so a message is atomic up
//! to [`queue::MAX_MESSAGE_BYTES`] and permissions follow the CI's ownership
//! naturally. `send` never blocks: the kernel socket's own buffer absorbs a
//! burst, and a background reader only drains it into the application-level
//! priority queue while that queue has room — once both are full, the next
//! `send` observes `WouldBlock` and the caller gets `queue_full` rather than
//! a silent drop or a blocked caller.

mod queue;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ci_core::{CoreError, CoreResult, Message};
use dashmap::DashMap;
use queue::{Queue, MAX_MESSAGE_BYTES};
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct QueueHandle {
    queue: Arc<Queue>,
    socket_path: PathBuf,
    reader: JoinHandle<()>,
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.reader.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// The Message Bus: one bounded, prioritized queue per CI name.
pub struct MessageBus {
    dir: PathBuf,
    queues: DashMap<String, QueueHandle>,
}

impl MessageBus {
    /// `dir` is the configured socket directory (spec.md §6.3, `ci_queues/`).
    pub fn new(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::PersistFailed(format!("creating bus dir: {e}")))?;
        Ok(Self {
            dir,
            queues: DashMap::new(),
        })
    }

    fn socket_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.sock"))
    }

    /// Create (or no-op) the named queue and its backing socket.
    pub fn create(&self, name: &str) -> CoreResult<()> {
        if self.queues.contains_key(name) {
            return Ok(());
        }

        let socket_path = self.socket_path(name);
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .map_err(|e| CoreError::PersistFailed(format!("removing stale socket: {e}")))?;
        }

        let socket = UnixDatagram::bind(&socket_path)
            .map_err(|e| CoreError::TransportFailure(format!("binding bus socket: {e}")))?;

        let queue = Arc::new(Queue::default());
        let reader = tokio::spawn(Self::reader_loop(name.to_string(), socket, queue.clone()));

        self.queues.insert(
            name.to_string(),
            QueueHandle {
                queue,
                socket_path,
                reader,
            },
        );
        debug!(name, "bus queue created");
        Ok(())
    }

    async fn reader_loop(name: String, socket: UnixDatagram, queue: Arc<Queue>) {
        let mut buf = vec![0u8; MAX_MESSAGE_BYTES];
        loop {
            if queue.is_full() {
                queue.wait_for_space().await;
                continue;
            }
            match socket.recv(&mut buf).await {
                Ok(n) => match serde_json::from_slice::<Message>(&buf[..n]) {
                    Ok(message) => queue.push(message),
                    Err(e) => warn!(name, error = %e, "dropping malformed bus datagram"),
                },
                Err(e) => {
                    warn!(name, error = %e, "bus socket read error, stopping reader");
                    break;
                }
            }
        }
    }

    /// Remove a queue and its socket.
    pub fn destroy(&self, name: &str) {
        self.queues.remove(name);
        debug!(name, "bus queue destroyed");
    }

    /// Send `message` to `to`'s queue without blocking.
    pub async fn send(&self, to: &str, message: &Message) -> CoreResult<()> {
        let handle = self
            .queues
            .get(to)
            .ok_or_else(|| CoreError::NoSuchQueue(to.to_string()))?;

        let payload = serde_json::to_vec(message)
            .map_err(|e| CoreError::Invalid(format!("encoding message: {e}")))?;
        if payload.len() > MAX_MESSAGE_BYTES {
            return Err(CoreError::Invalid(format!(
                "message of {} bytes exceeds the {} byte datagram limit",
                payload.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let socket = UnixDatagram::unbound()
            .map_err(|e| CoreError::TransportFailure(format!("creating sender socket: {e}")))?;

        match socket.try_send_to(&payload, &handle.socket_path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(CoreError::QueueFull(to.to_string()))
            }
            Err(e) => Err(CoreError::TransportFailure(format!("bus send failed: {e}"))),
        }
    }

    /// Receive the next highest-priority message for `name`, waiting up to
    /// `timeout`. Returns `Ok(None)` on timeout with nothing queued.
    pub async fn receive(&self, name: &str, timeout: Duration) -> CoreResult<Option<Message>> {
        let queue = self
            .queues
            .get(name)
            .map(|h| h.queue.clone())
            .ok_or_else(|| CoreError::NoSuchQueue(name.to_string()))?;

        if let Some(message) = queue.pop() {
            return Ok(Some(message));
        }

        match tokio::time::timeout(timeout, queue.wait_for_arrival()).await {
            Ok(()) => Ok(queue.pop()),
            Err(_) => Ok(None),
        }
    }

    #[must_use]
    pub fn socket_dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_core::Message;
    use tempfile::tempdir;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let dir = tempdir().unwrap();
        let bus = MessageBus::new(dir.path()).unwrap();
        bus.create("numa").unwrap();

        let msg = Message::chat("apollo", "numa", "hello");
        bus.send("numa", &msg).await.unwrap();

        let received = bus
            .receive("numa", Duration::from_secs(1))
            .await
            .unwrap()
            .expect("message arrives");
        assert_eq!(received.content, "hello");
    }

    #[tokio::test]
    async fn send_to_unknown_queue_errors() {
        let dir = tempdir().unwrap();
        let bus = MessageBus::new(dir.path()).unwrap();
        let msg = Message::chat("apollo", "ghost", "hello");
        let err = bus.send("ghost", &msg).await.unwrap_err();
        assert_eq!(err.code(), "no_such_queue");
    }

    #[tokio::test]
    async fn receive_times_out_with_nothing_queued() {
        let dir = tempdir().unwrap();
        let bus = MessageBus::new(dir.path()).unwrap();
        bus.create("rhetor").unwrap();

        let result = bus
            .receive("rhetor", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn destroy_removes_queue() {
        let dir = tempdir().unwrap();
        let bus = MessageBus::new(dir.path()).unwrap();
        bus.create("alice").unwrap();
        bus.destroy("alice");

        let msg = Message::chat("apollo", "alice", "hello");
        let err = bus.send("alice", &msg).await.unwrap_err();
        assert_eq!(err.code(), "no_such_queue");
    }
}
