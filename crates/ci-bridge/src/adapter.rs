//! Adapter selection (spec.md §4.5 step 4, §9 design note).
//!
//! Tool adapters are selected by a `kind` string. This module provides the
//! two built-in adapters spec.md requires — a stdio+JSON generic adapter and
//! a PTY-driving adapter for TUI children — plus a registry other adapters
//! can be added to at startup, either programmatically or by dropping a
//! JSON manifest into a configured directory (spec.md §9).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which I/O mode the Bridge uses to talk to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMode {
    Stdio,
    Pty,
}

/// The static behavior of one adapter kind: I/O mode, default delimiter,
/// cancellation sequence, and whether OS keystroke injection may be used.
/// Deserializable so a drop-in adapter manifest can describe one verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub kind: String,
    pub mode: BridgeMode,
    #[serde(with = "delimiter_bytes")]
    pub default_delimiter: Vec<u8>,
    /// Bytes written to the child to request cancellation of the
    /// in-flight request (spec.md §4.4 Cancellation).
    #[serde(with = "delimiter_bytes")]
    pub cancel_sequence: Vec<u8>,
    /// Best-effort OS keystroke injection (spec.md §4.4.1); must be
    /// explicitly enabled per tool.
    pub os_injection_allowed: bool,
}

/// Delimiters and cancel sequences are bytes, not necessarily valid UTF-8;
/// manifests spell them as a JSON array of byte values (`[27]` for ESC),
/// matching `ci_core::ToolInstance`'s persisted delimiter encoding.
mod delimiter_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        bytes.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(d)
    }
}

impl AdapterSpec {
    /// `generic`: stdio pipes, newline-delimited JSON, interrupt via a
    /// protocol-level cancel line.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            kind: "generic".to_string(),
            mode: BridgeMode::Stdio,
            default_delimiter: vec![b'\n'],
            cancel_sequence: br#"{"action":"cancel"}"#.to_vec(),
            os_injection_allowed: false,
        }
    }

    /// `claude-code`-style: PTY + line-JSON, interrupt via an ESC byte,
    /// because TUI children often ignore stdin writes entirely.
    #[must_use]
    pub fn claude_code() -> Self {
        Self {
            kind: "claude-code".to_string(),
            mode: BridgeMode::Pty,
            default_delimiter: vec![b'\r'],
            cancel_sequence: vec![0x1b],
            os_injection_allowed: true,
        }
    }
}

/// Adapter kinds known at startup, keyed by their `kind` string
/// (spec.md §9: "new adapters may be registered at startup from a
/// configured directory").
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, AdapterSpec>,
}

impl AdapterRegistry {
    /// A registry pre-populated with the two built-in adapters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(AdapterSpec::generic());
        registry.register(AdapterSpec::claude_code());
        registry
    }

    pub fn register(&mut self, spec: AdapterSpec) {
        self.adapters.insert(spec.kind.clone(), spec);
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&AdapterSpec> {
        self.adapters.get(kind)
    }

    /// Scan `dir` for `*.json` adapter manifests and register each one,
    /// overwriting a built-in of the same `kind` (spec.md §9). Missing
    /// directory is not an error — most deployments never drop in a
    /// custom adapter; a malformed manifest is logged and skipped so one
    /// bad file doesn't block the others.
    pub fn load_dir(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read adapter manifest directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<AdapterSpec>(&raw).map_err(|e| e.to_string()))
            {
                Ok(spec) => {
                    tracing::info!(kind = %spec.kind, path = %path.display(), "loaded adapter manifest");
                    self.register(spec);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed adapter manifest"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_both_bridge_modes() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(registry.get("generic").unwrap().mode, BridgeMode::Stdio);
        assert_eq!(registry.get("claude-code").unwrap().mode, BridgeMode::Pty);
    }

    #[test]
    fn unknown_kind_is_absent() {
        let registry = AdapterRegistry::with_builtins();
        assert!(registry.get("no-such-adapter").is_none());
    }

    #[test]
    fn load_dir_registers_a_manifest_and_overrides_a_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("aider.json"),
            r#"{"kind":"aider","mode":"stdio","default_delimiter":[10],"cancel_sequence":[27],"os_injection_allowed":false}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("generic.json"),
            r#"{"kind":"generic","mode":"pty","default_delimiter":[13],"cancel_sequence":[27],"os_injection_allowed":true}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("not-an-adapter.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let mut registry = AdapterRegistry::with_builtins();
        registry.load_dir(dir.path());

        assert_eq!(registry.get("aider").unwrap().mode, BridgeMode::Stdio);
        assert_eq!(registry.get("generic").unwrap().mode, BridgeMode::Pty);
        assert!(registry.get("generic").unwrap().os_injection_allowed);
    }

    #[test]
    fn load_dir_is_a_no_op_when_the_directory_does_not_exist() {
        let mut registry = AdapterRegistry::with_builtins();
        registry.load_dir(Path::new("/no/such/adapter/directory"));
        assert_eq!(registry.get("generic").unwrap().mode, BridgeMode::Stdio);
    }
}
