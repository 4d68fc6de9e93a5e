//! `aish` argument parsing (spec.md §6.1). The subcommand names and flags
//! are taken verbatim from the spec; everything the user actually supplies
//! is validated here before a single network call is made.

use clap::{Args, Parser, Subcommand};

/// Connection settings shared by every subcommand that talks to the MCP
/// server, mirroring the teacher CLI's flattened `Connection` struct.
#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// Base URL of the MCP server (overrides `AISH_MCP_HOST`/`AISH_MCP_PORT`).
    #[arg(long, global = true, env = "AISH_MCP_URL")]
    pub url: Option<String>,
    /// Emit machine-readable JSON instead of a human summary.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "aish",
    version,
    about = "Send messages to and manage CIs registered with the orchestration core"
)]
pub struct Cli {
    #[command(flatten)]
    pub conn: Connection,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to a CI by name.
    Send {
        /// Name of the CI to address.
        ci_name: String,
        /// Message content.
        message: String,
        /// Append the effective delimiter to the message and mark it executable.
        #[arg(short = 'x', long = "execute", value_name = "DELIMITER", num_args = 0..=1, default_missing_value = "")]
        execute: Option<String>,
        /// Stream the response as it arrives instead of waiting for EOF.
        #[arg(long)]
        stream: bool,
    },
    /// List registered CIs.
    List {
        /// Restrict to one CI type: greek, terminal, project, tool.
        #[arg(long = "type", value_name = "TYPE")]
        ci_type: Option<String>,
    },
    /// Broadcast a message to the team (all greek/terminal CIs).
    TeamChat {
        message: String,
    },
    /// Tool lifecycle management.
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Wrap a command in a PTY and expose it as a tool-class CI over TCP.
    CiTerminal(WrapperArgs),
    /// Wrap a command's stdio and expose it as a tool-class CI over TCP.
    CiTool(WrapperArgs),
    /// Manage observed-traffic forwarding to a terminal CI.
    Forward {
        ci_name: String,
        terminal: String,
        /// Forward as structured JSON rather than plain text.
        #[arg(value_name = "json")]
        json_mode: Option<String>,
    },
    /// Remove a forward.
    Unforward {
        ci_name: String,
    },
    /// List active forwards.
    Forwards,
    /// Report MCP server health.
    Status,
    /// Reload the registry from disk and external discovery sources.
    Restart,
    /// Tail the MCP server's log file.
    Logs,
    /// Dump the server's self-described capabilities.
    DebugMcp,
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommand {
    /// List tool definitions known to the supervisor.
    List,
    /// Launch a defined tool.
    Launch {
        name: String,
        #[arg(long)]
        instance: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Terminate a running tool instance.
    Terminate {
        name: String,
    },
    /// Report running status for one tool, or all if omitted.
    Status {
        name: Option<String>,
    },
    /// List all running tool instances.
    Instances,
    /// Persist a new tool definition.
    Define {
        name: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        executable: String,
        /// `auto` for dynamic allocation, or an explicit port number.
        #[arg(long, default_value = "auto")]
        port: String,
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        /// Shell-quoted launch argument string, split on whitespace.
        #[arg(long)]
        launch_args: Option<String>,
        /// Repeatable `KEY=VALUE` environment overlay entries.
        #[arg(long = "env", value_name = "K=V")]
        env: Vec<String>,
        #[arg(long)]
        health_check: Option<String>,
        #[arg(long)]
        delimiter: Option<String>,
    },
    /// Remove a user-defined tool definition.
    Undefine {
        name: String,
    },
    /// Show defined tools, or one by name.
    Defined {
        name: Option<String>,
    },
    /// Show capability tokens for a defined tool.
    Capabilities {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct WrapperArgs {
    /// Name this wrapper registers under.
    #[arg(short = 'n', long)]
    pub name: String,
    /// Delimiter appended on executable sends (C-style escapes accepted).
    #[arg(short = 'd', long)]
    pub delimiter: Option<String>,
    /// Enable best-effort OS keystroke injection for PTY-mode wraps
    /// (spec.md §4.4.1). Ignored in stdio mode.
    #[arg(long)]
    pub os_injection: bool,
    /// The command (and its arguments) to wrap.
    #[arg(last = true, required = true)]
    pub cmd: Vec<String>,
}

/// Resolve the MCP base URL: `--url`/`AISH_MCP_URL` wins, otherwise build
/// from `AISH_MCP_PORT` (spec.md §6.4) against localhost.
#[must_use]
pub fn resolve_base_url(conn: &Connection) -> String {
    if let Some(url) = &conn.url {
        return url.clone();
    }
    let port = std::env::var("AISH_MCP_PORT").unwrap_or_else(|_| "8118".to_string());
    format!("http://127.0.0.1:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolve_base_url_prefers_explicit_flag() {
        let conn = Connection {
            url: Some("http://example:9".to_string()),
            json: false,
        };
        assert_eq!(resolve_base_url(&conn), "http://example:9");
    }
}
