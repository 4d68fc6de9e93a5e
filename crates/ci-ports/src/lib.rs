//! Port Allocator (spec.md §4.2).
//!
//! Hands out unique TCP ports from a configured inclusive range, verifying
//! bindability before returning a lease (invariant 4 in spec.md §3.2).
//! Leases live only in memory; the supervisor rebuilds them at startup by
//! walking live tool instances.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use ci_core::{CoreError, CoreResult, PortLease};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How candidate ports are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    /// Always return the CI's preconfigured port (the `hint`); fail if taken.
    Static,
    /// Choose any free port in the configured range.
    Dynamic,
}

/// Inclusive `[start, end]` port range to allocate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        // spec.md §4.2: default 8400-8449 for tools.
        Self {
            start: 8400,
            end: 8449,
        }
    }
}

/// Hands out free TCP ports and tracks who holds them.
#[derive(Debug)]
pub struct PortAllocator {
    range: PortRange,
    mode: PortMode,
    leases: Mutex<BTreeMap<u16, PortLease>>,
}

impl PortAllocator {
    #[must_use]
    pub fn new(range: PortRange, mode: PortMode) -> Self {
        Self {
            range,
            mode,
            leases: Mutex::new(BTreeMap::new()),
        }
    }

    /// Acquire a port for `owner`. `hint` is the preferred/static port.
    ///
    /// Performs a linear scan starting at `hint` (or the range start),
    /// bind-probing each candidate. On exhaustion, retries once after a
    /// brief delay to allow `TIME_WAIT` sockets to release, then gives up.
    pub async fn acquire(&self, owner: &str, hint: Option<u16>) -> CoreResult<u16> {
        if self.mode == PortMode::Static {
            let port = hint.ok_or_else(|| {
                CoreError::Invalid("static port mode requires a hint".to_string())
            })?;
            return self.try_acquire_one(owner, port).await;
        }

        if let Some(port) = self.scan(owner, hint).await? {
            return Ok(port);
        }

        warn!(owner, "port range exhausted, retrying after TIME_WAIT delay");
        sleep(Duration::from_millis(250)).await;

        self.scan(owner, hint)
            .await?
            .ok_or(CoreError::PortExhausted)
    }

    async fn scan(&self, owner: &str, hint: Option<u16>) -> CoreResult<Option<u16>> {
        let start = hint.unwrap_or(self.range.start).max(self.range.start);
        // Scan from `start` to `end`, then wrap to cover the whole range
        // even when `hint` sits in the middle of it.
        let candidates = (start..=self.range.end).chain(self.range.start..start);

        for candidate in candidates {
            if self.leases.lock().contains_key(&candidate) {
                continue;
            }
            if Self::bindable(candidate).await {
                self.record_lease(candidate, owner);
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn try_acquire_one(&self, owner: &str, port: u16) -> CoreResult<u16> {
        if self.leases.lock().contains_key(&port) {
            return Err(CoreError::PortExhausted);
        }
        if Self::bindable(port).await {
            self.record_lease(port, owner);
            Ok(port)
        } else {
            Err(CoreError::PortExhausted)
        }
    }

    fn record_lease(&self, port: u16, owner: &str) {
        debug!(port, owner, "port lease acquired");
        self.leases
            .lock()
            .insert(port, PortLease::new(port, owner));
    }

    /// Bind-then-immediately-close probe: the only reliable way to know a
    /// port is free on `127.0.0.1` (spec.md §4.2 algorithm).
    async fn bindable(port: u16) -> bool {
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(_) => false,
        }
    }

    /// Release a lease. Returns `not_leased` if `owner` does not hold `port`.
    pub fn release(&self, port: u16, owner: &str) -> CoreResult<()> {
        let mut leases = self.leases.lock();
        match leases.get(&port) {
            Some(lease) if lease.owner == owner => {
                leases.remove(&port);
                debug!(port, owner, "port lease released");
                Ok(())
            }
            _ => Err(CoreError::NotLeased(port, owner.to_string())),
        }
    }

    #[must_use]
    pub fn leases(&self) -> Vec<PortLease> {
        self.leases.lock().values().cloned().collect()
    }

    /// Restore a lease at startup by walking a live tool instance's port,
    /// without re-probing bindability (the process already owns the port).
    pub fn adopt(&self, port: u16, owner: &str) {
        self.leases
            .lock()
            .insert(port, PortLease::new(port, owner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let alloc = PortAllocator::new(PortRange { start: 18400, end: 18410 }, PortMode::Dynamic);
        let port = alloc.acquire("tool-a", None).await.expect("acquire");
        assert!(alloc.leases().iter().any(|l| l.port == port));

        alloc.release(port, "tool-a").expect("release");
        assert!(alloc.leases().is_empty());
    }

    #[tokio::test]
    async fn second_release_returns_not_leased() {
        let alloc = PortAllocator::new(PortRange { start: 18420, end: 18430 }, PortMode::Dynamic);
        let port = alloc.acquire("tool-b", None).await.expect("acquire");
        alloc.release(port, "tool-b").expect("first release");

        let err = alloc.release(port, "tool-b").unwrap_err();
        assert_eq!(err.code(), "not_leased");
    }

    #[tokio::test]
    async fn concurrent_acquires_never_collide() {
        let alloc = std::sync::Arc::new(PortAllocator::new(
            PortRange { start: 18440, end: 18441 },
            PortMode::Dynamic,
        ));

        let a = alloc.clone();
        let b = alloc.clone();
        let (p1, p2) = tokio::join!(a.acquire("tool-a", None), b.acquire("tool-b", None));
        let p1 = p1.expect("tool-a acquires");
        let p2 = p2.expect("tool-b acquires");
        assert_ne!(p1, p2);

        // the range is now exhausted
        let err = alloc.acquire("tool-c", None).await.unwrap_err();
        assert_eq!(err.code(), "port_unavailable");
    }

    #[tokio::test]
    async fn static_mode_requires_hint() {
        let alloc = PortAllocator::new(PortRange::default(), PortMode::Static);
        let err = alloc.acquire("tool-a", None).await.unwrap_err();
        assert_eq!(err.code(), "invalid");
    }
}
