//! Platform-wide ("Numa"-class) AI registration (spec.md §4.9, GLOSSARY).
//!
//! A platform-wide AI is a peer AI with read visibility into every other
//! CI's endpoint. The orchestration core does not implement its domain
//! logic (spec.md §1 Non-goals: "implementing the domain logic of
//! individual AIs") — it only registers the entry so the rest of the
//! platform can address it by name, and tracks which names are
//! platform-wide for shutdown ordering (spec.md §4.9 "Shutdown... reverse:
//! platform-wide AIs are terminated first").

use std::sync::Arc;

use ci_core::{CiEntry, CiType, DefinedBy, MessageFormat};
use ci_registry::RegistryStore;

/// Well-known platform-wide AI names this deployment registers when
/// `REGISTER_AI` is set (spec.md §6.4). Real deployments configure these
/// externally; the core ships a single illustrative entry so the
/// coordinator has something concrete to sequence.
const PLATFORM_WIDE_NAMES: &[&str] = &["numa"];

/// Register the platform-wide AI entries if they are not already present.
/// Idempotent: re-running at startup after a crash does not duplicate
/// entries or error on a name collision.
pub async fn register_platform_wide(registry: &Arc<RegistryStore>) -> Vec<String> {
    let mut registered = Vec::new();
    for name in PLATFORM_WIDE_NAMES {
        if let Some(entry) = registry.get(name) {
            // A prior shutdown hides rather than removes this entry
            // (spec.md §3.1); bring it back into listings on restart.
            if entry.hidden {
                if let Err(e) = registry.unhide(name).await {
                    tracing::warn!(name, error = %e, "failed to unhide platform-wide AI on restart");
                }
            }
            registered.push((*name).to_string());
            continue;
        }
        let mut entry = CiEntry::new(*name, CiType::Greek, MessageFormat::RhetorSocket, DefinedBy::System);
        entry.description = "platform-wide supervisory AI with read visibility into every CI".to_string();
        match registry.register(entry).await {
            Ok(()) => {
                tracing::info!(name, "registered platform-wide AI");
                registered.push((*name).to_string());
            }
            Err(e) => tracing::warn!(name, error = %e, "failed to register platform-wide AI"),
        }
    }
    registered
}

/// Names the coordinator treats as platform-wide for shutdown ordering.
#[must_use]
pub fn platform_wide_names() -> Vec<String> {
    PLATFORM_WIDE_NAMES.iter().map(|s| (*s).to_string()).collect()
}
