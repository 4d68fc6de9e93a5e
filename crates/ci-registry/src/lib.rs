//! Registry Store (spec.md §4.1) — crash-safe, lock-protected persistence
//! of CI entries and their context state.

mod document;
mod persist;
mod reload;
mod store;

pub use document::RegistryDocument;
pub use store::{ListFilter, ReloadCounts, RegistryStore};
