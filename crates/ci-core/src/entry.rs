//! CI Entry — the registry's primary record (spec.md §3.1).

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four kinds of CI a registry entry can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiType {
    /// A first-party service AI with a long-lived HTTP endpoint.
    Greek,
    /// A human-attached or automated terminal session routed via the bus.
    Terminal,
    /// A CI tied to a particular project directory and configuration.
    Project,
    /// An externally-produced coding assistant wrapped by a socket bridge.
    Tool,
}

/// Transport-selection tag consumed by the Unified Router (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MessageFormat {
    /// Framed TCP request/response against a Greek Chorus endpoint.
    RhetorSocket,
    /// Enqueue-on-the-bus, optionally await-reply, routing for terminals.
    TermaRoute,
    /// Plain HTTP POST of the JSON message body, plain JSON response.
    JsonSimple,
    /// A tool-class CI reached through its Socket Bridge, keyed by adapter.
    Tool { adapter_kind: String },
}

/// Who created this entry — governs whether it can be removed (invariant 1
/// in spec.md §4.1's `remove` contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinedBy {
    System,
    User,
}

/// The registry's primary record (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiEntry {
    /// Unique key, kebab-case, no suffix.
    pub name: String,
    pub ci_type: CiType,
    pub message_format: MessageFormat,
    /// Host+port URL; `None` for stdio-only terminals.
    pub endpoint: Option<String>,
    pub description: String,
    pub capabilities: BTreeSet<String>,
    pub defined_by: DefinedBy,
    /// Tool-only: path to the executable.
    pub executable: Option<String>,
    /// Tool-only: ordered launch arguments.
    pub launch_args: Vec<String>,
    /// Tool-only: environment overlay.
    pub env: BTreeMap<String, String>,
    /// Token identifying a probe strategy (`version`, `ping`, `status`, `none`).
    pub health_check: String,
    pub created_at: DateTime<Utc>,
    /// Mutated by the Tool Supervisor; `None` until the CI has run at least
    /// once in this process's lifetime.
    pub pid: Option<u32>,
    /// Mutated by the Tool Supervisor.
    pub running: bool,
    /// System entries are hidden rather than deleted on teardown (spec.md
    /// §3.1). Hidden entries stay in the registry document and remain
    /// addressable by name; they are just excluded from listings by
    /// default (`ListFilter::include_hidden`).
    #[serde(default)]
    pub hidden: bool,
}

impl CiEntry {
    /// Build a new entry with a fresh `created_at` timestamp.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ci_type: CiType,
        message_format: MessageFormat,
        defined_by: DefinedBy,
    ) -> Self {
        Self {
            name: name.into(),
            ci_type,
            message_format,
            endpoint: None,
            description: String::new(),
            capabilities: BTreeSet::new(),
            defined_by,
            executable: None,
            launch_args: Vec::new(),
            env: BTreeMap::new(),
            health_check: "none".to_string(),
            created_at: Utc::now(),
            pid: None,
            running: false,
            hidden: false,
        }
    }

    /// System entries may be hidden but never deleted (spec.md §3.1).
    #[must_use]
    pub fn is_removable(&self) -> bool {
        self.defined_by == DefinedBy::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_entries_are_not_removable() {
        let entry = CiEntry::new(
            "numa",
            CiType::Greek,
            MessageFormat::RhetorSocket,
            DefinedBy::System,
        );
        assert!(!entry.is_removable());
    }

    #[test]
    fn user_entries_are_removable() {
        let entry = CiEntry::new(
            "echo-ci",
            CiType::Tool,
            MessageFormat::Tool {
                adapter_kind: "generic".into(),
            },
            DefinedBy::User,
        );
        assert!(entry.is_removable());
    }
}
