//! PTY-mode Socket Bridge (spec.md §4.4 "Algorithm (pty mode)").
//!
//! Required for TUI-style tools that bypass stdin entirely and read real
//! terminal input instead. `portable-pty`'s reader/writer handles are
//! blocking, so they're driven from dedicated OS threads and bridged to the
//! async world with channels, the same shape `portable-pty`-based terminal
//! wrappers in the wider ecosystem use.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, PtySize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::framing;
use crate::os_injection;
use crate::signals;

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Marries a PTY master fd to a TCP listening socket.
pub struct PtyBridge {
    child: Arc<std::sync::Mutex<Box<dyn PtyChild + Send + Sync>>>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    output_tx: broadcast::Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    accept_task: Option<JoinHandle<()>>,
    reader_thread: Option<std::thread::JoinHandle<()>>,
    writer_thread: Option<std::thread::JoinHandle<()>>,
    default_delimiter: Vec<u8>,
    port: u16,
    pid: u32,
}

impl PtyBridge {
    pub async fn start(
        executable: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        port: u16,
        default_delimiter: Vec<u8>,
        os_injection: bool,
    ) -> BridgeResult<Self> {
        signals::ignore_sigpipe();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(executable);
        for arg in args {
            cmd.arg(arg);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Pty(e.to_string()))?;
        drop(pair.slave);
        let pid = child.process_id().unwrap_or_default();
        info!(executable, port, pid, "pty bridge spawned child");

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let reader_tx = output_tx.clone();
        let reader_thread = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if reader_tx.send(buf[..n].to_vec()).is_err() {
                            // no subscribers right now; that's fine, keep draining
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "pty reader thread stopping");
                        break;
                    }
                }
            }
        });

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_thread = std::thread::spawn(move || {
            while let Some(bytes) = writer_rx.blocking_recv() {
                if writer.write_all(&bytes).is_err() || writer.flush().is_err() {
                    break;
                }
            }
        });

        // keep the master handle alive for the lifetime of the bridge by
        // leaking it into the reader/writer threads' closures above; the
        // pty crate tears it down when both clones are dropped.
        std::mem::forget(pair.master);

        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let listener = TcpListener::bind(addr).await?;

        let alive = Arc::new(AtomicBool::new(true));
        let accept_output_tx = output_tx.clone();
        let accept_writer_tx = writer_tx.clone();
        let accept_delimiter = default_delimiter.clone();
        let accept_alive = alive.clone();
        let accept_task = tokio::spawn(async move {
            while accept_alive.load(Ordering::SeqCst) {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        debug!(%peer, "pty bridge accepted client");
                        let sub = accept_output_tx.subscribe();
                        if let Err(e) = Self::relay_one_client(
                            socket,
                            sub,
                            accept_writer_tx.clone(),
                            &accept_delimiter,
                            os_injection,
                        )
                        .await
                        {
                            warn!(error = %e, "pty bridge client relay ended with error");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "pty bridge accept failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child: Arc::new(std::sync::Mutex::new(child)),
            writer_tx,
            output_tx,
            alive,
            accept_task: Some(accept_task),
            reader_thread: Some(reader_thread),
            writer_thread: Some(writer_thread),
            default_delimiter,
            port,
            pid,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    async fn relay_one_client(
        socket: tokio::net::TcpStream,
        mut output_rx: broadcast::Receiver<Vec<u8>>,
        writer_tx: mpsc::UnboundedSender<Vec<u8>>,
        default_delimiter: &[u8],
        os_injection: bool,
    ) -> BridgeResult<()> {
        let (client_read, mut client_write) = socket.into_split();
        let mut client_lines = BufReader::new(client_read).lines();

        loop {
            tokio::select! {
                biased;

                line = client_lines.next_line() => {
                    match line? {
                        Some(line) if !line.trim().is_empty() => {
                            match framing::decode(&line) {
                                Ok(message) => {
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
                                    let _ = writer_tx.send(payload);

                                    if os_injection {
                                        let content = message.content.clone();
                                        let execute = message.execute;
                                        tokio::spawn(async move {
                                            os_injection::inject_keystrokes(&content, execute).await;
                                        });
                                    }
                                }
                                Err(e) => warn!(error = %e, "malformed inbound frame"),
                            }
                        }
                        Some(_) => continue,
                        None => break,
                    }
                }

                chunk = output_rx.recv() => {
                    match chunk {
                        Ok(bytes) => {
                            client_write.write_all(&bytes).await?;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "pty client fell behind, dropping lagged output");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Write a cancel sequence (typically an ESC byte) straight into the
    /// PTY master, bypassing any client.
    pub fn cancel(&self, sequence: &[u8]) -> BridgeResult<()> {
        self.writer_tx
            .send(sequence.to_vec())
            .map_err(|_| BridgeError::NotRunning)
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

    pub async fn stop(&mut self, grace: std::time::Duration) -> BridgeResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }

        let child = self.child.clone();
        let killed = tokio::task::spawn_blocking(move || {
            let mut guard = child.lock().expect("pty child mutex poisoned");
            #[cfg(unix)]
            if let Some(pid) = guard.process_id() {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }
            guard.wait()
        });

        match tokio::time::timeout(grace, killed).await {
            Ok(Ok(_)) => Ok(()),
            _ => {
                let child = self.child.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    child.lock().expect("pty child mutex poisoned").kill()
                })
                .await;
                Ok(())
            }
        }
    }

    /// Subscribe to raw PTY output outside the TCP relay path.
    pub fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }
}

impl Drop for PtyBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_thread.take() {
            // the thread exits on its own once the master fd closes; we
            // don't block the async drop path waiting for it.
            drop(handle);
        }
        if let Some(handle) = self.writer_thread.take() {
            drop(handle);
        }
    }
}
