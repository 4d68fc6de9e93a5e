//! Tool Instance — a running child process bound to a `tool`-type CI entry
//! (spec.md §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selects which translation module the Socket Bridge uses for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// PTY + line-delimited JSON, for TUI-style tools.
    ClaudeCode,
    /// stdio pipes + line-delimited JSON.
    Generic,
}

/// A running child process bound to a CI Entry of type `tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInstance {
    /// May equal the tool's CI name, or be a named alias sharing its adapter.
    pub name: String,
    /// The base tool this instance was launched from.
    pub tool_name: String,
    pub pid: u32,
    pub port: u16,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub adapter_kind: AdapterKind,
    /// Byte sequence appended when a message carries the `execute` flag.
    #[serde(with = "delimiter_bytes")]
    pub delimiter: Vec<u8>,
    /// macOS/Linux only; best-effort OS keystroke injection (spec.md §4.4.1).
    pub os_injection: bool,
}

impl ToolInstance {
    #[must_use]
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Delimiters are bytes, not strings (spec.md §4.4): serialize as a JSON
/// array of bytes so arbitrary (including non-UTF8) delimiters round-trip,
/// while still being human-editable as `[10]` or `[13, 10]` in the
/// persisted custom-tools file.
mod delimiter_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        bytes.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_non_negative_immediately_after_start() {
        let inst = ToolInstance {
            name: "echo-ci".into(),
            tool_name: "echo-ci".into(),
            pid: 1234,
            port: 8400,
            session_id: "s1".into(),
            started_at: Utc::now(),
            adapter_kind: AdapterKind::Generic,
            delimiter: b"\n".to_vec(),
            os_injection: false,
        };
        assert!(inst.uptime() >= chrono::Duration::zero());
    }
}
