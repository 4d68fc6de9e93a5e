//! `aish status | restart | logs | debug-mcp` (spec.md §6.1): MCP server
//! management commands that talk to the running server rather than a
//! specific CI.

use serde_json::Value;
use std::io::{Read, Seek, SeekFrom};

use crate::cli::Connection;
use crate::client::McpClient;
use crate::error::CliResult;
use crate::output;

pub async fn status(client: &McpClient, conn: &Connection) -> CliResult<()> {
    let response = client.get("/health").await?;
    output::display(conn, &response);
    Ok(())
}

pub async fn debug_mcp(client: &McpClient, conn: &Connection) -> CliResult<()> {
    let response = client.get("/capabilities").await?;
    output::display(conn, &response);
    Ok(())
}

/// The core has no remote-restart RPC (spec.md §4.9's startup/shutdown
/// ordering is a process-level concern handled by the Lifecycle
/// Coordinator, not something exposed over HTTP). The closest in-band
/// equivalent a running server offers is reloading the registry from its
/// external discovery sources, so that is what this reaches for.
pub async fn restart(client: &McpClient, conn: &Connection) -> CliResult<()> {
    let response = client.post("/tools/registry/reload", &Value::Null).await?;
    output::display(conn, &response);
    Ok(())
}

/// Tail the most recent MCP log file under the configured logs directory
/// (spec.md §6.3 `logs/mcp-<date>.log`), the way the orchestrator itself
/// writes it (JSON lines, daily rotation).
pub async fn logs(conn: &Connection, lines: usize) -> CliResult<()> {
    let config = ci_orchestrator::Config::from_env();
    let logs_dir = config.logs_dir();

    let mut entries: Vec<_> = std::fs::read_dir(&logs_dir)
        .map_err(|e| crate::error::CliError::RegistryInconsistent(format!(
            "cannot read {}: {e}",
            logs_dir.display()
        )))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let Some(latest) = entries.last() else {
        println!("no log files found under {}", logs_dir.display());
        return Ok(());
    };

    let mut file = std::fs::File::open(latest.path())
        .map_err(|e| crate::error::CliError::RegistryInconsistent(e.to_string()))?;
    let len = file
        .seek(SeekFrom::End(0))
        .map_err(|e| crate::error::CliError::RegistryInconsistent(e.to_string()))?;
    let tail_start = len.saturating_sub(64 * 1024);
    file.seek(SeekFrom::Start(tail_start))
        .map_err(|e| crate::error::CliError::RegistryInconsistent(e.to_string()))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|e| crate::error::CliError::RegistryInconsistent(e.to_string()))?;

    let tail: Vec<&str> = buf.lines().collect();
    let start = tail.len().saturating_sub(lines);
    if conn.json {
        println!("{}", serde_json::json!({ "lines": &tail[start..] }));
    } else {
        for line in &tail[start..] {
            println!("{line}");
        }
    }
    Ok(())
}
