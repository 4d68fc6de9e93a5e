//! `aish forward | unforward | forwards` (spec.md §6.1, §6.2 `/tools/forward`).

use serde_json::json;

use crate::cli::Connection;
use crate::client::McpClient;
use crate::error::CliResult;
use crate::output;

pub async fn add(
    client: &McpClient,
    conn: &Connection,
    ci_name: &str,
    terminal: &str,
    json_mode: bool,
) -> CliResult<()> {
    let body = json!({
        "action": "add",
        "ai_name": ci_name,
        "terminal": terminal,
        "json": json_mode,
    });
    let response = client.post("/tools/forward", &body).await?;
    output::display(conn, &response);
    Ok(())
}

pub async fn remove(client: &McpClient, conn: &Connection, ci_name: &str) -> CliResult<()> {
    let body = json!({ "action": "remove", "ai_name": ci_name });
    let response = client.post("/tools/forward", &body).await?;
    output::display(conn, &response);
    Ok(())
}

pub async fn list(client: &McpClient, conn: &Connection) -> CliResult<()> {
    let body = json!({ "action": "list" });
    let response = client.post("/tools/forward", &body).await?;
    output::display(conn, &response);
    Ok(())
}
