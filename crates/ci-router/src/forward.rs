//! Forward table (spec.md §4.6): diverts or copies traffic addressed to one
//! CI to a named terminal, for operators observing or steering a conversation.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ForwardTable {
    forwards: DashMap<String, String>,
}

impl ForwardTable {
    pub fn add(&self, from: &str, terminal: &str) {
        self.forwards.insert(from.to_string(), terminal.to_string());
    }

    pub fn remove(&self, from: &str) -> bool {
        self.forwards.remove(from).is_some()
    }

    #[must_use]
    pub fn get(&self, from: &str) -> Option<String> {
        self.forwards.get(from).map(|t| t.value().clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<(String, String)> {
        self.forwards
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_then_remove() {
        let table = ForwardTable::default();
        table.add("numa", "main-terminal");
        assert_eq!(table.get("numa").as_deref(), Some("main-terminal"));
        assert!(table.remove("numa"));
        assert!(table.get("numa").is_none());
    }

    #[test]
    fn remove_unknown_returns_false() {
        let table = ForwardTable::default();
        assert!(!table.remove("ghost"));
    }
}
