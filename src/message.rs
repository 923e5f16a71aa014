// Message data model
//
// One turn in a conversation. User messages are complete at creation;
// assistant messages start incomplete and are filled in by the stream
// consumer as deltas arrive. `is_complete` transitions false -> true
// exactly once and never back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque unique identifier, assigned at creation time.
    pub id: String,
    /// Owning conversation. May be empty before a conversation exists.
    pub conversation_id: String,
    /// UTF-8 text. Mutable only while `is_complete` is false.
    pub content: String,
    pub is_from_user: bool,
    /// False for in-flight assistant messages, true otherwise.
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A user turn. User messages are always complete at creation.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: next_id(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            is_from_user: true,
            is_complete: true,
            created_at: Utc::now(),
        }
    }

    /// An assistant placeholder that the stream consumer will fill in.
    pub fn assistant_pending(conversation_id: impl Into<String>) -> Self {
        Self {
            id: next_id(),
            conversation_id: conversation_id.into(),
            content: String::new(),
            is_from_user: false,
            is_complete: false,
            created_at: Utc::now(),
        }
    }
}

fn next_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Partial field set merged into an existing message by
/// `Transcript::update`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageUpdate {
    pub content: Option<String>,
    pub is_complete: Option<bool>,
    pub conversation_id: Option<String>,
}

impl MessageUpdate {
    /// Replace the message content with the given cumulative text.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Mark the message complete.
    pub fn complete() -> Self {
        Self {
            is_complete: Some(true),
            ..Self::default()
        }
    }

    /// Replace the content and mark the message complete in one merge.
    pub fn finish(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_complete: Some(true),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // 1. Constructors set the completion flag per role
    // ---------------------------------------------------------------

    #[test]
    fn user_message_is_complete_at_creation() {
        let msg = Message::user("conv_1", "Hello");
        assert!(msg.is_from_user);
        assert!(msg.is_complete);
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.conversation_id, "conv_1");
    }

    #[test]
    fn assistant_pending_starts_empty_and_incomplete() {
        let msg = Message::assistant_pending("conv_1");
        assert!(!msg.is_from_user);
        assert!(!msg.is_complete);
        assert_eq!(msg.content, "");
    }

    // ---------------------------------------------------------------
    // 2. IDs are unique and opaque
    // ---------------------------------------------------------------

    #[test]
    fn message_ids_are_unique() {
        let a = Message::user("c", "x");
        let b = Message::user("c", "x");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("msg_"));
    }

    // ---------------------------------------------------------------
    // 3. MessageUpdate helpers populate only the named fields
    // ---------------------------------------------------------------

    #[test]
    fn update_content_leaves_completion_alone() {
        let upd = MessageUpdate::content("partial");
        assert_eq!(upd.content.as_deref(), Some("partial"));
        assert_eq!(upd.is_complete, None);
    }

    #[test]
    fn update_complete_leaves_content_alone() {
        let upd = MessageUpdate::complete();
        assert_eq!(upd.content, None);
        assert_eq!(upd.is_complete, Some(true));
    }

    #[test]
    fn update_finish_sets_both() {
        let upd = MessageUpdate::finish("done");
        assert_eq!(upd.content.as_deref(), Some("done"));
        assert_eq!(upd.is_complete, Some(true));
    }

    // ---------------------------------------------------------------
    // 4. Serialization round-trip
    // ---------------------------------------------------------------

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("conv_9", "round trip");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
