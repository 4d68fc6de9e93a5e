//! Context State — per-CI staged/next prompt protocol (spec.md §3.1, §9).

use serde::{Deserialize, Serialize};

/// Role tag for a prompt record. Modeled as a tagged sum per spec.md §9's
/// design note rather than a freeform map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single role-tagged message in a staged or next prompt sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-CI context record: what it last said, what Apollo has staged, and
/// what the Router will prepend to its next inbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    /// The most recent response emitted by this CI.
    pub last_output: String,
    /// Apollo-prepared, not yet active.
    pub staged_prompt: Vec<PromptMessage>,
    /// Will be prepended to this CI's next inbound message.
    pub next_prompt: Vec<PromptMessage>,
}

/// A sparse update to a [`ContextState`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextPatch {
    pub last_output: Option<String>,
    pub staged_prompt: Option<Vec<PromptMessage>>,
    pub next_prompt: Option<Vec<PromptMessage>>,
}

impl ContextState {
    /// Apply a patch in place, writing only the provided slots.
    pub fn apply_patch(&mut self, patch: ContextPatch) {
        if let Some(last_output) = patch.last_output {
            self.last_output = last_output;
        }
        if let Some(staged_prompt) = patch.staged_prompt {
            self.staged_prompt = staged_prompt;
        }
        if let Some(next_prompt) = patch.next_prompt {
            self.next_prompt = next_prompt;
        }
    }

    /// Atomically move `staged_prompt` into `next_prompt` (append) and clear
    /// staged. Returns `false` if there was nothing staged (spec.md §4.1).
    pub fn promote_staged(&mut self) -> bool {
        if self.staged_prompt.is_empty() {
            return false;
        }
        self.next_prompt.append(&mut self.staged_prompt);
        true
    }

    /// Atomically read and clear `next_prompt`.
    pub fn consume_next(&mut self) -> Vec<PromptMessage> {
        std::mem::take(&mut self.next_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_staged_moves_and_clears() {
        let mut ctx = ContextState::default();
        ctx.staged_prompt
            .push(PromptMessage::new(Role::System, "focus on performance"));

        assert!(ctx.promote_staged());
        assert!(ctx.staged_prompt.is_empty());
        assert_eq!(ctx.next_prompt.len(), 1);

        // nothing left staged: a second promote is a no-op
        assert!(!ctx.promote_staged());
    }

    #[test]
    fn consume_next_clears_after_reading() {
        let mut ctx = ContextState::default();
        ctx.next_prompt
            .push(PromptMessage::new(Role::System, "hi"));

        let first = ctx.consume_next();
        assert_eq!(first.len(), 1);
        let second = ctx.consume_next();
        assert!(second.is_empty());
    }
}
