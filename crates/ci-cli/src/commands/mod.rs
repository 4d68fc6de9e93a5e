//! One module per `aish` subcommand group, each translating parsed [`crate::cli`]
//! arguments into one or more [`crate::client::McpClient`] calls.

pub mod forward;
pub mod server;
pub mod tools;
pub mod wrapper;

use serde_json::json;

use crate::cli::Connection;
use crate::client::McpClient;
use crate::error::CliResult;
use crate::output;

pub async fn send(
    client: &McpClient,
    conn: &Connection,
    ci_name: &str,
    message: &str,
    execute: Option<&str>,
    stream: bool,
) -> CliResult<()> {
    let mut body = json!({
        "ai_name": ci_name,
        "message": message,
        "stream": stream,
    });
    if let Some(delim) = execute {
        body["execute"] = json!(true);
        if !delim.is_empty() {
            body["delimiter"] = json!(delim);
        }
    }

    if stream {
        client
            .stream_send_message(&body, |delta| print!("{delta}"))
            .await?;
        println!();
        return Ok(());
    }

    let response = client.post("/tools/send-message", &body).await?;
    output::display(conn, &response);
    Ok(())
}

pub async fn list(client: &McpClient, conn: &Connection, ci_type: Option<&str>) -> CliResult<()> {
    let body = json!({ "ci_type": ci_type });
    let response = client.post("/tools/list-ais", &body).await?;
    output::display(conn, &response);
    Ok(())
}

pub async fn team_chat(client: &McpClient, conn: &Connection, message: &str) -> CliResult<()> {
    let body = json!({ "message": message });
    let response = client.post("/tools/team-chat", &body).await?;
    output::display(conn, &response);
    Ok(())
}
