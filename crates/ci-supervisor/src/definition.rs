//! User-defined tool definitions, persisted alongside the registry
//! (spec.md §4.5 "Persistence").

use std::collections::{BTreeMap, BTreeSet};

use ci_bridge::parse_delimiter;
use serde::{Deserialize, Serialize};

/// Options accepted by `define()` (spec.md §6.1 `aish tools define`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    /// `generic`, `claude-code`, or a user-installed adapter name.
    pub adapter_kind: String,
    pub executable: String,
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// `None` means dynamic port allocation ("auto").
    #[serde(default)]
    pub port_hint: Option<u16>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default = "default_health_check")]
    pub health_check: String,
    /// Raw delimiter spec (spec.md §9 open question); parsed at launch time
    /// via [`ci_bridge::parse_delimiter`].
    #[serde(default)]
    pub delimiter: String,
    #[serde(default)]
    pub os_injection: bool,
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,
}

fn default_health_check() -> String {
    "none".to_string()
}

fn default_auto_restart() -> bool {
    true
}

impl ToolDefinition {
    #[must_use]
    pub fn effective_delimiter(&self) -> Vec<u8> {
        parse_delimiter(&self.delimiter)
    }
}

/// The on-disk shape of `ci_tools/custom_tools.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DefinitionsFile {
    pub tools: BTreeMap<String, ToolDefinition>,
}

pub fn load(path: &std::path::Path) -> DefinitionsFile {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

pub fn save(path: &std::path::Path, file: &DefinitionsFile) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = {
        let mut s = path.as_os_str().to_owned();
        s.push(".tmp");
        std::path::PathBuf::from(s)
    };
    let json = serde_json::to_vec_pretty(file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
