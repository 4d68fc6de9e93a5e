//! stdio-mode Socket Bridge (spec.md §4.4 "Algorithm (stdio mode)").

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::framing;
use crate::signals;

/// Marries a child process's stdio pipes to a TCP listening socket.
///
/// Accepts one client at a time. Bytes from the client are parsed as
/// newline-delimited JSON [`ci_core::Message`]s and written to the child's
/// stdin (with the delimiter appended when `execute` is set); bytes from
/// the child's stdout are relayed to the client verbatim as they arrive;
/// stderr is mirrored to the orchestrator's log.
pub struct StdioBridge {
    child: Arc<AsyncMutex<Child>>,
    alive: Arc<AtomicBool>,
    accept_task: Option<JoinHandle<()>>,
    liveness_task: Option<JoinHandle<()>>,
    default_delimiter: Vec<u8>,
    port: u16,
    pid: u32,
}

impl StdioBridge {
    /// Spawn `executable` with `args`/`env` and start listening on
    /// `127.0.0.1:port`.
    pub async fn start(
        executable: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        port: u16,
        default_delimiter: Vec<u8>,
    ) -> BridgeResult<Self> {
        // OS keystroke injection (spec.md §4.4.1) is a PTY-mode-only escape
        // hatch for tools that ignore stdin; stdio-mode tools take input
        // over the pipe directly, so there is no injection path to wire up
        // here regardless of a definition's `os_injection` flag.
        signals::ignore_sigpipe();

        let mut command = Command::new(executable);
        command
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        signals::set_pdeathsig(&mut command);

        let child = command.spawn().map_err(BridgeError::SpawnFailed)?;
        let pid = child.id().unwrap_or_default();
        info!(executable, port, pid, "stdio bridge spawned child");

        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let listener = TcpListener::bind(addr).await?;

        let alive = Arc::new(AtomicBool::new(true));
        let child = Arc::new(AsyncMutex::new(child));

        let accept_task = tokio::spawn(Self::accept_loop(
            listener,
            child.clone(),
            alive.clone(),
            default_delimiter.clone(),
        ));
        let liveness_task = signals::spawn_liveness_guard(child.clone());

        Ok(Self {
            child,
            alive,
            accept_task: Some(accept_task),
            liveness_task: Some(liveness_task),
            default_delimiter,
            port,
            pid,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    async fn accept_loop(
        listener: TcpListener,
        child: Arc<AsyncMutex<Child>>,
        alive: Arc<AtomicBool>,
        default_delimiter: Vec<u8>,
    ) {
        while alive.load(Ordering::SeqCst) {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    debug!(%peer, "stdio bridge accepted client");
                    if let Err(e) =
                        Self::relay_one_client(socket, &child, &default_delimiter).await
                    {
                        warn!(error = %e, "stdio bridge client relay ended with error");
                    }
                }
                Err(e) => {
                    error!(error = %e, "stdio bridge accept failed");
                    break;
                }
            }
        }
    }

    /// Relay one client connection until it disconnects or the child exits.
    /// Mirrors spec.md §4.4's four-way select: client readable, child
    /// stdout readable, child stderr readable (mirrored to the log).
    async fn relay_one_client(
        socket: tokio::net::TcpStream,
        child: &Arc<AsyncMutex<Child>>,
        default_delimiter: &[u8],
    ) -> BridgeResult<()> {
        let (client_read, mut client_write) = socket.into_split();
        let mut client_lines = BufReader::new(client_read).lines();

        let (mut stdout, mut stderr, mut stdin) = {
            let mut guard = child.lock().await;
            (
                guard.stdout.take(),
                guard.stderr.take(),
                guard.stdin.take(),
            )
        };

        let mut stdout_lines = stdout.take().map(|s| BufReader::new(s).lines());
        let mut stderr_lines = stderr.take().map(|s| BufReader::new(s).lines());

        loop {
            tokio::select! {
                biased;

                client_line = client_lines.next_line() => {
                    match client_line? {
                        Some(line) if !line.trim().is_empty() => {
                            match framing::decode(&line) {
                                Ok(message) => {
                                    if let Some(stdin) = stdin.as_mut() {
                                        let delimiter = message
                                            .delimiter
                                            .as_ref()
                                            .map(|d| crate::delimiter::parse_delimiter(d))
                                            .unwrap_or_else(|| default_delimiter.to_vec());
                                        let payload = framing::stdin_payload(
                                            &message.content,
                                            message.execute,
                                            &delimiter,
                                        );
                                        stdin.write_all(&payload).await?;
                                        stdin.flush().await?;
                                    }
                                }
                                Err(e) => warn!(error = %e, "malformed inbound frame"),
                            }
                        }
                        Some(_) => continue,
                        None => {
                            debug!("client disconnected");
                            break;
                        }
                    }
                }

                out_line = async {
                    match stdout_lines.as_mut() {
                        Some(lines) => lines.next_line().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match out_line? {
                        Some(line) => {
                            client_write.write_all(line.as_bytes()).await?;
                            client_write.write_all(b"\n").await?;
                        }
                        None => {
                            debug!("child stdout closed");
                            break;
                        }
                    }
                }

                err_line = async {
                    match stderr_lines.as_mut() {
                        Some(lines) => lines.next_line().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match err_line? {
                        Some(line) => warn!(child_stderr = %line),
                        None => { /* stderr closed; keep relaying stdout */ }
                    }
                }
            }
        }

        // hand the pipes back so a future client on this bridge can reuse them
        if let Some(stdin) = stdin {
            child.lock().await.stdin = Some(stdin);
        }
        Ok(())
    }

    /// Write a cancel sequence directly to the child's stdin.
    pub async fn cancel(&self, sequence: &[u8]) -> BridgeResult<()> {
        let mut guard = self.child.lock().await;
        if let Some(stdin) = guard.stdin.as_mut() {
            stdin.write_all(sequence).await?;
            stdin.flush().await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn default_delimiter(&self) -> &[u8] {
        &self.default_delimiter
    }

    /// Terminate the child: SIGTERM, then SIGKILL after `grace`
    /// (spec.md §4.4 `stop()`).
    pub async fn stop(&mut self, grace: std::time::Duration) -> BridgeResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        if let Some(task) = self.liveness_task.take() {
            task.abort();
        }

        let mut guard = self.child.lock().await;
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            if let Some(pid) = guard.id() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        match tokio::time::timeout(grace, guard.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                guard.kill().await?;
                Ok(())
            }
        }
    }
}
