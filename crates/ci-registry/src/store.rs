//! Registry Store (spec.md §4.1).

use std::path::{Path, PathBuf};

use ci_core::{CiEntry, CiType, ContextPatch, ContextState, CoreError, CoreResult, DefinedBy, PromptMessage};
use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::document::RegistryDocument;
use crate::persist;
use crate::reload;

/// Optional predicate for [`RegistryStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub ci_type: Option<CiType>,
    pub defined_by: Option<DefinedBy>,
    /// Hidden entries (spec.md §3.1) are excluded from listings unless
    /// this is set — set it to see the system entries a prior `hide` call
    /// tore down without deleting.
    pub include_hidden: bool,
}

impl ListFilter {
    fn matches(&self, entry: &CiEntry) -> bool {
        self.ci_type.is_none_or(|t| t == entry.ci_type)
            && self.defined_by.is_none_or(|d| d == entry.defined_by)
            && (self.include_hidden || !entry.hidden)
    }
}

/// Before/after entry counts returned by [`RegistryStore::reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadCounts {
    pub before: usize,
    pub after: usize,
}

/// Crash-safe, lock-protected registry of CI entries and their context
/// state. Safe for concurrent callers: mutating operations take the
/// in-process `write_mutex` to serialize the read-modify-persist sequence,
/// and persistence itself takes an OS-level exclusive file lock so
/// cooperating processes never interleave writes.
pub struct RegistryStore {
    path: PathBuf,
    backups_dir: PathBuf,
    queue_dir: PathBuf,
    project_roots: Vec<PathBuf>,
    entries: DashMap<String, CiEntry>,
    contexts: DashMap<String, ContextState>,
    write_mutex: tokio::sync::Mutex<()>,
}

impl RegistryStore {
    /// Construct a store rooted at `path` (spec.md §6.3 `registry.json`),
    /// loading any existing document synchronously so the in-memory index
    /// is populated before first use.
    pub fn new(path: impl Into<PathBuf>, project_roots: Vec<PathBuf>) -> Self {
        let path = path.into();
        let backups_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("backups");
        let queue_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("ci_queues");

        let store = Self {
            path,
            backups_dir,
            queue_dir,
            project_roots,
            entries: DashMap::new(),
            contexts: DashMap::new(),
            write_mutex: tokio::sync::Mutex::new(()),
        };
        store.load_from_disk();
        store
    }

    fn load_from_disk(&self) {
        let doc = match persist::load(&self.path) {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "registry.json is corrupt, attempting backup recovery");
                match persist::restore_latest_backup(&self.backups_dir) {
                    Some(doc) => {
                        info!("registry_recovered from backup after corrupt primary file");
                        doc
                    }
                    None => {
                        warn!("no usable backup found, starting from an empty registry");
                        RegistryDocument::default()
                    }
                }
            }
        };
        for (name, entry) in doc.entries {
            self.entries.insert(name, entry);
        }
        for (name, context) in doc.context {
            self.contexts.insert(name, context);
        }
    }

    fn snapshot(&self) -> RegistryDocument {
        let mut doc = RegistryDocument::default();
        for entry in self.entries.iter() {
            doc.entries.insert(entry.key().clone(), entry.value().clone());
        }
        for context in self.contexts.iter() {
            doc.context
                .insert(context.key().clone(), context.value().clone());
        }
        doc.touch();
        doc
    }

    /// Persist a full snapshot of the in-memory state to disk under the
    /// exclusive file lock, writing a rolling daily backup alongside it.
    /// Runs on the blocking thread pool since file I/O and locking are
    /// blocking operations (spec.md §5: lock held for one atomic swap only,
    /// serialization happens on a defensive copy outside the lock).
    async fn persist(&self) -> CoreResult<()> {
        let doc = self.snapshot();
        let path = self.path.clone();
        let backups_dir = self.backups_dir.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let _lock = persist::acquire_lock(&path)?;
            persist::save(&path, &doc)?;
            persist::maybe_backup(&backups_dir, &doc)?;
            Ok(())
        })
        .await
        .map_err(|e| CoreError::PersistFailed(format!("persist task panicked: {e}")))?
        .map_err(|e| CoreError::PersistFailed(e.to_string()))
    }

    /// Register a new entry. Fails with `name_taken` if the name already
    /// exists (invariant 1, spec.md §3.2).
    pub async fn register(&self, entry: CiEntry) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        if self.entries.contains_key(&entry.name) {
            return Err(CoreError::NameTaken(entry.name));
        }
        let name = entry.name.clone();
        self.entries.insert(name.clone(), entry);
        if let Err(e) = self.persist().await {
            self.entries.remove(&name);
            return Err(e);
        }
        Ok(())
    }

    /// Apply `mutator` to a deep copy of the named entry and persist the
    /// result atomically.
    pub async fn update(&self, name: &str, mutator: impl FnOnce(&mut CiEntry)) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        let previous = self
            .entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownCi(name.to_string()))?;

        let mut updated = previous.clone();
        mutator(&mut updated);
        self.entries.insert(name.to_string(), updated);

        if let Err(e) = self.persist().await {
            self.entries.insert(name.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<CiEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Snapshot matching entries; callers needing a consistent multi-entry
    /// view should call this once and operate on the returned copy
    /// (spec.md §5 — no snapshot isolation across separate calls).
    #[must_use]
    pub fn list(&self, filter: &ListFilter) -> Vec<CiEntry> {
        self.entries
            .iter()
            .map(|e| e.value().clone())
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Remove a user-defined entry. System entries are hidden-but-never-
    /// deleted (spec.md §3.1).
    pub async fn remove(&self, name: &str) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        let entry = self
            .entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownCi(name.to_string()))?;
        if !entry.is_removable() {
            return Err(CoreError::SystemEntryProtected(name.to_string()));
        }

        self.entries.remove(name);
        let removed_context = self.contexts.remove(name);
        if let Err(e) = self.persist().await {
            self.entries.insert(name.to_string(), entry);
            if let Some((_, context)) = removed_context {
                self.contexts.insert(name.to_string(), context);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Mark an entry hidden without deleting it — the teardown path for
    /// system entries, which `remove` refuses (spec.md §3.1). The entry
    /// stays registered and addressable by name; it just drops out of
    /// `list()` results unless the caller sets `ListFilter::include_hidden`.
    pub async fn hide(&self, name: &str) -> CoreResult<()> {
        self.update(name, |entry| entry.hidden = true).await
    }

    /// Reverse of [`Self::hide`].
    pub async fn unhide(&self, name: &str) -> CoreResult<()> {
        self.update(name, |entry| entry.hidden = false).await
    }

    #[must_use]
    pub fn get_context(&self, name: &str) -> Option<ContextState> {
        self.contexts.get(name).map(|c| c.value().clone())
    }

    /// Apply a sparse patch, writing only the provided slots, then persist.
    pub async fn set_context(&self, name: &str, patch: ContextPatch) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        if !self.entries.contains_key(name) {
            return Err(CoreError::UnknownCi(name.to_string()));
        }
        self.contexts
            .entry(name.to_string())
            .or_default()
            .apply_patch(patch);
        self.persist().await
    }

    /// Atomically move `staged_prompt` into `next_prompt` and clear staged
    /// (invariant 3, spec.md §3.2). The per-key shard lock DashMap takes
    /// internally makes this atomic with respect to concurrent
    /// `set_context`/`consume_next` calls on the same CI.
    pub async fn promote_staged(&self, name: &str) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        let promoted = {
            let mut context = self.contexts.entry(name.to_string()).or_default();
            context.promote_staged()
        };
        if !promoted {
            return Err(CoreError::NothingStaged(name.to_string()));
        }
        self.persist().await
    }

    /// Atomically read and clear `next_prompt`.
    pub async fn consume_next(&self, name: &str) -> CoreResult<Vec<PromptMessage>> {
        let _guard = self.write_mutex.lock().await;
        let consumed = {
            let mut context = self.contexts.entry(name.to_string()).or_default();
            context.consume_next()
        };
        if !consumed.is_empty() {
            self.persist().await?;
        }
        Ok(consumed)
    }

    /// Rescan externally maintained discovery sources (project config
    /// files, terminal bus sockets) and reconcile them into the registry.
    pub async fn reload(&self) -> CoreResult<ReloadCounts> {
        let _guard = self.write_mutex.lock().await;
        let before = self.entries.len();

        let known: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut discovered = reload::discover_projects(&self.project_roots);
        discovered.extend(reload::discover_terminals(&self.queue_dir, &known));

        for entry in discovered {
            self.entries.entry(entry.name.clone()).or_insert(entry);
        }

        let after = self.entries.len();
        self.persist().await?;
        Ok(ReloadCounts { before, after })
    }

    /// Explicit persistence hook, for callers that want to force a write
    /// without going through a mutating operation (spec.md §6.2
    /// `/tools/registry/save`).
    pub async fn save(&self) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        self.persist().await
    }

    /// Explicit reload-from-disk hook, discarding in-memory state.
    pub async fn load(&self) -> CoreResult<()> {
        let _guard = self.write_mutex.lock().await;
        self.entries.clear();
        self.contexts.clear();
        self.load_from_disk();
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_core::{MessageFormat, Role};
    use tempfile::tempdir;

    fn tool_entry(name: &str) -> CiEntry {
        CiEntry::new(
            name,
            CiType::Tool,
            MessageFormat::Tool {
                adapter_kind: "generic".into(),
            },
            DefinedBy::User,
        )
    }

    fn system_entry(name: &str) -> CiEntry {
        CiEntry::new(
            name,
            CiType::Greek,
            MessageFormat::RhetorSocket,
            DefinedBy::System,
        )
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(tool_entry("echo-ci")).await.unwrap();

        let got = store.get("echo-ci").expect("entry exists");
        assert_eq!(got.name, "echo-ci");
    }

    #[tokio::test]
    async fn duplicate_register_fails_with_name_taken() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(tool_entry("echo-ci")).await.unwrap();

        let err = store.register(tool_entry("echo-ci")).await.unwrap_err();
        assert_eq!(err.code(), "name_taken");
    }

    #[tokio::test]
    async fn system_entries_cannot_be_removed() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(system_entry("numa")).await.unwrap();

        let err = store.remove("numa").await.unwrap_err();
        assert_eq!(err.code(), "system_entry_protected");
        assert!(store.get("numa").is_some());
    }

    #[tokio::test]
    async fn user_entries_can_be_removed() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(tool_entry("echo-ci")).await.unwrap();

        store.remove("echo-ci").await.unwrap();
        assert!(store.get("echo-ci").is_none());
    }

    #[tokio::test]
    async fn hide_drops_a_system_entry_from_listings_without_deleting_it() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(system_entry("numa")).await.unwrap();

        store.hide("numa").await.unwrap();
        assert!(store.get("numa").unwrap().hidden);
        assert!(store
            .list(&ListFilter {
                ci_type: None,
                defined_by: None,
                include_hidden: false,
            })
            .is_empty());
        assert_eq!(
            store
                .list(&ListFilter {
                    ci_type: None,
                    defined_by: None,
                    include_hidden: true,
                })
                .len(),
            1
        );

        store.unhide("numa").await.unwrap();
        assert!(!store.get("numa").unwrap().hidden);
        assert_eq!(
            store
                .list(&ListFilter {
                    ci_type: None,
                    defined_by: None,
                    include_hidden: false,
                })
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn promote_staged_then_consume_next_matches_scenario_s2() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(system_entry("numa")).await.unwrap();

        store
            .set_context(
                "numa",
                ContextPatch {
                    staged_prompt: Some(vec![PromptMessage::new(
                        Role::System,
                        "focus on performance",
                    )]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.promote_staged("numa").await.unwrap();

        let first = store.consume_next("numa").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].content, "focus on performance");

        let second = store.consume_next("numa").await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn promote_staged_with_nothing_staged_errors() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(system_entry("numa")).await.unwrap();

        let err = store.promote_staged("numa").await.unwrap_err();
        assert_eq!(err.code(), "nothing_staged");
    }

    #[tokio::test]
    async fn save_then_load_is_byte_identical_after_reserialization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = RegistryStore::new(&path, vec![]);
        store.register(tool_entry("echo-ci")).await.unwrap();
        store.save().await.unwrap();

        let raw_before = std::fs::read_to_string(&path).unwrap();
        store.load().await.unwrap();
        store.save().await.unwrap();
        let raw_after = std::fs::read_to_string(&path).unwrap();

        let before: serde_json::Value = serde_json::from_str(&raw_before).unwrap();
        let after: serde_json::Value = serde_json::from_str(&raw_after).unwrap();
        assert_eq!(before["entries"], after["entries"]);
    }

    #[tokio::test]
    async fn list_filters_by_type_and_owner() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"), vec![]);
        store.register(tool_entry("echo-ci")).await.unwrap();
        store.register(system_entry("numa")).await.unwrap();

        let tools = store.list(&ListFilter {
            ci_type: Some(CiType::Tool),
            defined_by: None,
            include_hidden: false,
        });
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo-ci");
    }
}
