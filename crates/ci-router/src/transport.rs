//! Per-`message_format` transports dispatched by [`crate::router::UnifiedRouter`]
//! (spec.md §4.6 step 3).

use std::time::Duration;

use ci_core::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{RouterError, RouterResult};

/// Default non-streaming RPC timeout (spec.md §5).
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a dispatch: either the single response line a non-streaming
/// caller waits for, or a channel of chunks a streaming caller drains.
pub enum RouteOutcome {
    Buffered(String),
    Stream(mpsc::Receiver<String>),
}

/// Newline-delimited JSON framing over a plain TCP connection, shared by the
/// `rhetor_socket` and tool-class branches (spec.md §4.6, §4.4).
pub async fn send_framed_tcp(addr: &str, message: &Message, stream: bool) -> RouterResult<RouteOutcome> {
    let socket = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = socket.into_split();

    let line = ci_bridge::framing::encode(message)?;
    write_half.write_all(&line).await?;
    write_half.flush().await?;

    let mut lines = BufReader::new(read_half).lines();

    if stream {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(chunk)) => {
                        if tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "streaming transport read failed");
                        break;
                    }
                }
            }
        });
        return Ok(RouteOutcome::Stream(rx));
    }

    match tokio::time::timeout(DEFAULT_RPC_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(chunk))) => Ok(RouteOutcome::Buffered(chunk)),
        Ok(Ok(None)) => Err(RouterError::EmptyResponse),
        Ok(Err(e)) => Err(RouterError::Io(e)),
        Err(_) => Err(RouterError::Core(ci_core::CoreError::Timeout(
            DEFAULT_RPC_TIMEOUT.as_millis() as u64,
        ))),
    }
}

/// `json_simple`: a plain HTTP POST of the message body (spec.md §4.6).
pub async fn send_json_simple(
    client: &reqwest::Client,
    endpoint: &str,
    message: &Message,
) -> RouterResult<String> {
    let response = client
        .post(endpoint)
        .json(message)
        .timeout(DEFAULT_RPC_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_framed_tcp_buffered_reads_one_response_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let _request = lines.next_line().await.unwrap();
            write_half.write_all(b"response one\n").await.unwrap();
        });

        let msg = Message::chat("cli", "echo-ci", "ping");
        let outcome = send_framed_tcp(&addr.to_string(), &msg, false).await.unwrap();
        match outcome {
            RouteOutcome::Buffered(chunk) => assert_eq!(chunk, "response one"),
            RouteOutcome::Stream(_) => panic!("expected buffered outcome"),
        }
    }

    #[tokio::test]
    async fn send_framed_tcp_stream_relays_multiple_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let _request = lines.next_line().await.unwrap();
            write_half.write_all(b"chunk one\nchunk two\n").await.unwrap();
        });

        let msg = Message::chat("cli", "echo-ci", "ping");
        let outcome = send_framed_tcp(&addr.to_string(), &msg, true).await.unwrap();
        match outcome {
            RouteOutcome::Stream(mut rx) => {
                assert_eq!(rx.recv().await.unwrap(), "chunk one");
                assert_eq!(rx.recv().await.unwrap(), "chunk two");
            }
            RouteOutcome::Buffered(_) => panic!("expected stream outcome"),
        }
    }
}
