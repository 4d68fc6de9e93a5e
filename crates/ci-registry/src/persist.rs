//! Atomic, crash-safe persistence of the registry document (spec.md §4.1).
//!
//! Writes use the temp-file-and-rename technique: write the complete
//! document to `<path>.tmp`, `fsync`, rename onto the target path. An
//! exclusive file-scope advisory lock (`fs2`) is held around the
//! read-modify-write sequence so cooperating OS processes never interleave.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::{info, warn};

use crate::document::RegistryDocument;

/// Holds the exclusive advisory lock on `registry.json` for the lifetime of
/// one read-modify-write sequence. The lock is released on drop.
pub struct RegistryLock {
    _file: File,
}

/// Acquire the file-scope lock, blocking the calling (blocking-pool) thread
/// until it is free. Creates the file if it does not yet exist.
pub fn acquire_lock(path: &Path) -> std::io::Result<RegistryLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(RegistryLock { _file: file })
}

/// Load the document from disk. A missing file yields the default (empty)
/// document; a corrupt file is the caller's responsibility to recover from
/// (see [`crate::backup`]).
pub fn load(path: &Path) -> Result<RegistryDocument, serde_json::Error> {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw),
        Err(_) => Ok(RegistryDocument::default()),
    }
}

/// Read the raw file contents, if present, without attempting to parse.
pub fn read_raw(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

/// Write `doc` to `path` using the temp-file-and-rename technique.
pub fn save(path: &Path, doc: &RegistryDocument) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);
    {
        let mut tmp = File::create(&tmp_path)?;
        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}

/// Write a rolling daily backup at `backups/registry-YYYY-MM-DD.json`,
/// skipping the write if today's backup already exists.
pub fn maybe_backup(backups_dir: &Path, doc: &RegistryDocument) -> std::io::Result<()> {
    fs::create_dir_all(backups_dir)?;
    let filename = format!("registry-{}.json", Utc::now().format("%Y-%m-%d"));
    let backup_path = backups_dir.join(filename);
    if backup_path.exists() {
        return Ok(());
    }
    save(&backup_path, doc)?;
    info!(path = %backup_path.display(), "wrote rolling registry backup");
    Ok(())
}

/// Find and load the most recent backup under `backups_dir`, for recovery
/// from a corrupt primary file.
pub fn restore_latest_backup(backups_dir: &Path) -> Option<RegistryDocument> {
    let mut entries: Vec<_> = fs::read_dir(backups_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("registry-") && n.ends_with(".json"))
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());
    let latest = entries.pop()?;
    match fs::read_to_string(latest.path()) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(error = %e, "latest backup is itself corrupt");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let doc = RegistryDocument::default();

        save(&path, &doc).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.version, doc.version);
    }

    #[test]
    fn load_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let loaded = load(&path).unwrap();
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn corrupt_file_fails_to_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, b"{not valid json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn backup_is_written_once_per_day() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        let doc = RegistryDocument::default();

        maybe_backup(&backups, &doc).unwrap();
        let count_before = fs::read_dir(&backups).unwrap().count();
        maybe_backup(&backups, &doc).unwrap();
        let count_after = fs::read_dir(&backups).unwrap().count();

        assert_eq!(count_before, 1);
        assert_eq!(count_after, 1);
    }

    #[test]
    fn restore_latest_backup_recovers_most_recent() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();

        let mut old = RegistryDocument::default();
        old.entries.insert(
            "old-entry".into(),
            dummy_entry("old-entry"),
        );
        save(&backups.join("registry-2020-01-01.json"), &old).unwrap();

        let mut newer = RegistryDocument::default();
        newer.entries.insert(
            "new-entry".into(),
            dummy_entry("new-entry"),
        );
        save(&backups.join("registry-2099-01-01.json"), &newer).unwrap();

        let restored = restore_latest_backup(&backups).expect("a backup exists");
        assert!(restored.entries.contains_key("new-entry"));
    }

    fn dummy_entry(name: &str) -> ci_core::CiEntry {
        ci_core::CiEntry::new(
            name,
            ci_core::CiType::Tool,
            ci_core::MessageFormat::Tool {
                adapter_kind: "generic".into(),
            },
            ci_core::DefinedBy::User,
        )
    }
}
