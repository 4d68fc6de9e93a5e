//! `Config`: the orchestrator binary's environment-derived settings
//! (spec.md §6.4), in the style of `turbomcp-server::config::ServerConfig`.

use std::path::PathBuf;

use ci_ports::{PortMode, PortRange};

/// Default MCP bind port (spec.md §6.4 `AISH_MCP_PORT`).
const DEFAULT_MCP_PORT: u16 = 8118;
/// Default tool port range (spec.md §4.2).
const DEFAULT_PORT_RANGE: (u16, u16) = (8400, 8449);

/// Everything the orchestrator needs to wire up the core, read once at
/// startup from the environment variables in spec.md §6.4.
#[derive(Debug, Clone)]
pub struct Config {
    /// `~/.tekton/` by default (spec.md §6.3), or `~/.tekton/<stack_id>/`
    /// when `TEKTON_STACK_ID` is set (spec.md §4.5 "Multi-stack support").
    pub root: PathBuf,
    pub mcp_bind: std::net::SocketAddr,
    pub port_mode: PortMode,
    pub port_range: PortRange,
    /// Namespace token for multi-stack deployments; `None` outside one.
    pub stack_id: Option<String>,
    /// Gates platform-wide AI launching (spec.md §4.9, §6.4 `REGISTER_AI`).
    pub register_ai: bool,
}

impl Config {
    /// Populate from the process environment, applying the defaults named
    /// in spec.md §6.4 for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_id = std::env::var("TEKTON_STACK_ID")
            .ok()
            .filter(|s| !s.is_empty());

        let home = dirs_home();
        let root = match &stack_id {
            Some(id) => home.join(".tekton").join(id),
            None => home.join(".tekton"),
        };

        let mcp_port = std::env::var("AISH_MCP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MCP_PORT);

        let port_mode = match std::env::var("CI_TOOLS_PORT_MODE").as_deref() {
            Ok("static") => PortMode::Static,
            _ => PortMode::Dynamic,
        };

        let port_range = std::env::var("CI_TOOLS_PORT_RANGE")
            .ok()
            .and_then(|raw| parse_range(&raw))
            .unwrap_or(PortRange {
                start: DEFAULT_PORT_RANGE.0,
                end: DEFAULT_PORT_RANGE.1,
            });

        let register_ai = std::env::var("REGISTER_AI")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Self {
            root,
            mcp_bind: std::net::SocketAddr::from(([127, 0, 0, 1], mcp_port)),
            port_mode,
            port_range,
            stack_id,
            register_ai,
        }
    }

    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    #[must_use]
    pub fn custom_tools_path(&self) -> PathBuf {
        self.root.join("ci_tools").join("custom_tools.json")
    }

    /// Drop-in adapter manifests scanned at startup, in addition to the
    /// built-in `generic`/`claude-code` adapters (spec.md §9).
    #[must_use]
    pub fn adapters_dir(&self) -> PathBuf {
        self.root.join("ci_tools").join("adapters")
    }

    #[must_use]
    pub fn queue_dir(&self) -> PathBuf {
        self.root.join("ci_queues")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

fn parse_range(raw: &str) -> Option<PortRange> {
    let (lo, hi) = raw.split_once('-')?;
    let start = lo.trim().parse().ok()?;
    let end = hi.trim().parse().ok()?;
    Some(PortRange { start, end })
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_parses_lo_hi() {
        assert_eq!(
            parse_range("8400-8449"),
            Some(PortRange {
                start: 8400,
                end: 8449
            })
        );
        assert_eq!(parse_range("not-a-range"), None);
    }
}
