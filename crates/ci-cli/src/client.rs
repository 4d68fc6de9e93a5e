//! Thin HTTP client over the MCP surface (spec.md §6.2), in the style of
//! the teacher's `transports::http` module — one request type in, one
//! `serde_json::Value` out, errors classified at the call site.

use serde_json::Value;
use std::time::Duration;

use crate::error::{from_envelope, CliError, CliResult};

/// Non-streaming request timeout (spec.md §5: 30s default).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct McpClient {
    base_url: String,
    http: reqwest::Client,
}

impl McpClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { base_url, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/mcp/v2{path}", self.base_url.trim_end_matches('/'))
    }

    pub async fn get(&self, path: &str) -> CliResult<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::into_value(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> CliResult<Value> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::into_value(response).await
    }

    pub async fn delete(&self, path: &str) -> CliResult<Value> {
        let response = self.http.delete(self.url(path)).send().await?;
        Self::into_value(response).await
    }

    async fn into_value(response: reqwest::Response) -> CliResult<Value> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| CliError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        let code = body.get("code").and_then(Value::as_str).unwrap_or("invalid");
        let detail = body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        Err(from_envelope(code, detail))
    }

    /// Streams `POST /tools/send-message` with `stream: true` as SSE,
    /// invoking `on_delta` for every chunk and returning once `done` arrives.
    pub async fn stream_send_message(
        &self,
        body: &Value,
        mut on_delta: impl FnMut(&str),
    ) -> CliResult<()> {
        use futures::StreamExt;

        let response = self
            .http
            .post(self.url("/tools/send-message"))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| CliError::Transport(e.to_string()))?;
            let code = body.get("code").and_then(Value::as_str).unwrap_or("invalid");
            let detail = body
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            return Err(from_envelope(code, detail));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CliError::Transport(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(idx) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..idx + 2).collect();
                if let Some(rest) = frame.strip_prefix("data: ") {
                    if let Ok(event) = serde_json::from_str::<Value>(rest.trim()) {
                        if event.get("done").and_then(Value::as_bool) == Some(true) {
                            return Ok(());
                        }
                        if let Some(delta) = event.get("delta").and_then(Value::as_str) {
                            on_delta(delta);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
