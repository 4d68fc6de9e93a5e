//! `aish`: the CI orchestration core's CLI surface (spec.md §6.1).

mod cli;
mod client;
mod commands;
mod error;
mod output;

use clap::Parser;
use cli::{resolve_base_url, Cli, Commands};
use client::McpClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let conn = cli.conn.clone();
    let client = McpClient::new(resolve_base_url(&conn));

    let result = dispatch(client, conn, cli.command).await;

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn dispatch(
    client: McpClient,
    conn: cli::Connection,
    command: Commands,
) -> error::CliResult<()> {
    match command {
        Commands::Send {
            ci_name,
            message,
            execute,
            stream,
        } => {
            commands::send(
                &client,
                &conn,
                &ci_name,
                &message,
                execute.as_deref(),
                stream,
            )
            .await
        }
        Commands::List { ci_type } => commands::list(&client, &conn, ci_type.as_deref()).await,
        Commands::TeamChat { message } => commands::team_chat(&client, &conn, &message).await,
        Commands::Tools { command } => commands::tools::run(&client, &conn, command).await,
        Commands::CiTerminal(args) => {
            commands::wrapper::run(args, ci_bridge::BridgeMode::Pty).await
        }
        Commands::CiTool(args) => commands::wrapper::run(args, ci_bridge::BridgeMode::Stdio).await,
        Commands::Forward {
            ci_name,
            terminal,
            json_mode,
        } => {
            commands::forward::add(
                &client,
                &conn,
                &ci_name,
                &terminal,
                json_mode.as_deref() == Some("json"),
            )
            .await
        }
        Commands::Unforward { ci_name } => commands::forward::remove(&client, &conn, &ci_name).await,
        Commands::Forwards => commands::forward::list(&client, &conn).await,
        Commands::Status => commands::server::status(&client, &conn).await,
        Commands::Restart => commands::server::restart(&client, &conn).await,
        Commands::Logs => commands::server::logs(&conn, 200).await,
        Commands::DebugMcp => commands::server::debug_mcp(&client, &conn).await,
    }
}
