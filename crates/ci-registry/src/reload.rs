//! Reconciliation of externally-maintained discovery sources against the
//! registry (spec.md §4.1 `reload()`).

use std::path::{Path, PathBuf};

use ci_core::{CiEntry, CiType, DefinedBy, MessageFormat};
use serde::Deserialize;
use tracing::warn;

/// The on-disk shape of a project's `.ci-project.json` descriptor — the one
/// discovery source spec.md's `reload()` names without detailing (SPEC_FULL
/// §4.1 supplement).
#[derive(Debug, Deserialize)]
struct ProjectDescriptor {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// Scan each project root for a `.ci-project.json` file and produce the
/// `project`-type CI entry it describes.
pub fn discover_projects(project_roots: &[PathBuf]) -> Vec<CiEntry> {
    let mut discovered = Vec::new();
    for root in project_roots {
        let descriptor_path = root.join(".ci-project.json");
        match std::fs::read_to_string(&descriptor_path) {
            Ok(raw) => match serde_json::from_str::<ProjectDescriptor>(&raw) {
                Ok(descriptor) => {
                    let mut entry = CiEntry::new(
                        descriptor.name,
                        CiType::Project,
                        MessageFormat::JsonSimple,
                        DefinedBy::System,
                    );
                    entry.description = descriptor.description;
                    entry.capabilities = descriptor.capabilities.into_iter().collect();
                    discovered.push(entry);
                }
                Err(e) => warn!(path = %descriptor_path.display(), error = %e, "invalid project descriptor"),
            },
            Err(_) => continue,
        }
    }
    discovered
}

/// Scan the Message Bus's queue directory for terminal sockets that do not
/// yet have a registry entry and synthesize `terminal`-type entries for
/// them. Terminal sessions register their own socket when launched
/// (`aish ci-terminal`); this only catches sessions the registry missed.
pub fn discover_terminals(queue_dir: &Path, known: &[String]) -> Vec<CiEntry> {
    let Ok(read_dir) = std::fs::read_dir(queue_dir) else {
        return Vec::new();
    };

    read_dir
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let stem = path.file_stem()?.to_str()?.to_string();
            if path.extension().and_then(|e| e.to_str()) != Some("sock") {
                return None;
            }
            if known.contains(&stem) {
                return None;
            }
            Some(CiEntry::new(
                stem,
                CiType::Terminal,
                MessageFormat::TermaRoute,
                DefinedBy::System,
            ))
        })
        .collect()
}
