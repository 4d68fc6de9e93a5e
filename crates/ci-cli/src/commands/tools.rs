//! `aish tools ...` (spec.md §6.1): the Tool Supervisor's CLI surface.

use serde_json::json;

use crate::cli::{Connection, ToolsCommand};
use crate::client::McpClient;
use crate::error::CliResult;
use crate::output;

pub async fn run(client: &McpClient, conn: &Connection, command: ToolsCommand) -> CliResult<()> {
    match command {
        ToolsCommand::List => {
            let response = client.get("/tools/ci-tools").await?;
            output::display(conn, &response);
        }
        ToolsCommand::Launch {
            name,
            instance,
            session,
        } => {
            let body = json!({
                "tool_name": name,
                "instance_name": instance,
                "session_id": session,
            });
            let response = client.post("/tools/ci-tools/launch", &body).await?;
            output::display(conn, &response);
        }
        ToolsCommand::Terminate { name } => {
            let body = json!({ "tool_name": name });
            let response = client.post("/tools/ci-tools/terminate", &body).await?;
            output::display(conn, &response);
        }
        ToolsCommand::Status { name } => {
            let path = match &name {
                Some(name) => format!("/tools/ci-tools/status/{name}"),
                None => "/tools/ci-tools/instances".to_string(),
            };
            let response = client.get(&path).await?;
            output::display(conn, &response);
        }
        ToolsCommand::Instances => {
            let response = client.get("/tools/ci-tools/instances").await?;
            output::display(conn, &response);
        }
        ToolsCommand::Define {
            name,
            kind,
            executable,
            port,
            capabilities,
            launch_args,
            env,
            health_check,
            delimiter,
        } => {
            let port = if port == "auto" {
                None
            } else {
                Some(port.parse::<u16>().map_err(|_| {
                    crate::error::CliError::Usage(format!("invalid --port value: {port}"))
                })?)
            };
            let launch_args: Vec<String> = launch_args
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let env = parse_env_pairs(&env)?;

            let body = json!({
                "name": name,
                "type": kind,
                "executable": executable,
                "options": {
                    "port": port,
                    "capabilities": capabilities,
                    "launch_args": launch_args,
                    "env": env,
                    "health_check": health_check,
                    "delimiter": delimiter,
                },
            });
            let response = client.post("/tools/ci-tools/define", &body).await?;
            output::display(conn, &response);
        }
        ToolsCommand::Undefine { name } => {
            let response = client.delete(&format!("/tools/ci-tools/{name}")).await?;
            output::display(conn, &response);
        }
        ToolsCommand::Defined { name } => {
            let response = client.get("/tools/ci-tools").await?;
            let response = match &name {
                Some(name) => response.get(name).cloned().ok_or_else(|| {
                    crate::error::CliError::UnknownCi(format!("no definition for {name}"))
                })?,
                None => response,
            };
            output::display(conn, &response);
        }
        ToolsCommand::Capabilities { name } => {
            let response = client
                .get(&format!("/tools/ci-tools/capabilities/{name}"))
                .await?;
            output::display(conn, &response);
        }
    }
    Ok(())
}

fn parse_env_pairs(pairs: &[String]) -> CliResult<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            crate::error::CliError::Usage(format!("--env entry must be KEY=VALUE, got: {pair}"))
        })?;
        map.insert(key.to_string(), json!(value));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_pairs_splits_on_first_equals() {
        let pairs = vec!["A=1".to_string(), "B=x=y".to_string()];
        let map = parse_env_pairs(&pairs).unwrap();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "x=y");
    }

    #[test]
    fn parse_env_pairs_rejects_missing_equals() {
        let pairs = vec!["NOVALUE".to_string()];
        assert!(parse_env_pairs(&pairs).is_err());
    }
}
