//! Unified Socket Bridge handle: picks stdio or PTY mode per adapter
//! (spec.md §4.4 `start(child_cmd, port, mode)`).

use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapter::BridgeMode;
use crate::error::BridgeResult;
use crate::pty::PtyBridge;
use crate::stdio::StdioBridge;

/// Grace period between SIGTERM and SIGKILL on `stop()` (spec.md §5).
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// A running Socket Bridge, in either stdio or PTY mode.
pub enum SocketBridge {
    Stdio(StdioBridge),
    Pty(PtyBridge),
}

impl SocketBridge {
    pub async fn start(
        mode: BridgeMode,
        executable: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        port: u16,
        default_delimiter: Vec<u8>,
        os_injection: bool,
    ) -> BridgeResult<Self> {
        match mode {
            BridgeMode::Stdio => {
                StdioBridge::start(executable, args, env, port, default_delimiter)
                    .await
                    .map(Self::Stdio)
            }
            BridgeMode::Pty => PtyBridge::start(
                executable,
                args,
                env,
                port,
                default_delimiter,
                os_injection,
            )
            .await
            .map(Self::Pty),
        }
    }

    pub async fn stop(&mut self) -> BridgeResult<()> {
        match self {
            Self::Stdio(b) => b.stop(TERMINATE_GRACE).await,
            Self::Pty(b) => b.stop(TERMINATE_GRACE).await,
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Stdio(b) => b.is_alive(),
            Self::Pty(b) => b.is_alive(),
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        match self {
            Self::Stdio(b) => b.port(),
            Self::Pty(b) => b.port(),
        }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        match self {
            Self::Stdio(b) => b.pid(),
            Self::Pty(b) => b.pid(),
        }
    }

    /// Send the cancellation sequence for a `cancel`-typed message
    /// (spec.md §4.4 "Cancellation").
    pub async fn cancel(&self, sequence: &[u8]) -> BridgeResult<()> {
        match self {
            Self::Stdio(b) => b.cancel(sequence).await,
            Self::Pty(b) => b.cancel(sequence),
        }
    }
}
