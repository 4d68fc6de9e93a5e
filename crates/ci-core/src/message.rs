//! Message — the unit of Router and Bus traffic (spec.md §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The semantic kind of a message, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Chat,
    Command,
    ContextInjection,
    CapabilityQuery,
    Cancel,
}

/// The unit of Router and Bus traffic (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender name, or `"system"`/`"cli"`.
    pub from: String,
    /// CI name or broadcast group.
    pub to: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// If true, the Bridge appends `delimiter` to `content` on stdin write.
    #[serde(default)]
    pub execute: bool,
    /// Per-message delimiter override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// 0-31, higher dequeued first on the Bus. Default 16 (mid-priority).
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Correlates streamed chunks and responses.
    #[serde(default = "Uuid::new_v4")]
    pub request_id: Uuid,
}

fn default_priority() -> u8 {
    16
}

impl Message {
    /// Build a chat message with sensible defaults for the optional fields.
    #[must_use]
    pub fn chat(from: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            content: content.into(),
            message_type: MessageType::Chat,
            execute: false,
            delimiter: None,
            priority: default_priority(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }

    /// Build a cancellation message targeting an in-flight `request_id`.
    #[must_use]
    pub fn cancel(from: impl Into<String>, to: impl Into<String>, request_id: Uuid) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            content: String::new(),
            message_type: MessageType::Cancel,
            execute: false,
            delimiter: None,
            priority: 31,
            timestamp: Utc::now(),
            request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_has_mid_priority_by_default() {
        let msg = Message::chat("cli", "numa", "hello");
        assert_eq!(msg.priority, 16);
        assert!(!msg.execute);
    }

    #[test]
    fn cancel_message_carries_highest_priority() {
        let rid = Uuid::new_v4();
        let msg = Message::cancel("system", "claude-code", rid);
        assert_eq!(msg.priority, 31);
        assert_eq!(msg.request_id, rid);
        assert_eq!(msg.message_type, MessageType::Cancel);
    }

    #[test]
    fn serde_roundtrip_preserves_shape() {
        let msg = Message::chat("cli", "numa", "hello world");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
