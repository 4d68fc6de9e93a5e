//! On-disk shape of `registry.json` (spec.md §6.3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ci_core::{CiEntry, ContextState};
use serde::{Deserialize, Serialize};

const CURRENT_VERSION: &str = "1.0";

/// The full persisted registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub entries: BTreeMap<String, CiEntry>,
    pub context: BTreeMap<String, ContextState>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
            context: BTreeMap::new(),
        }
    }
}

impl RegistryDocument {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
