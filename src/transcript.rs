// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Transcript state
//
// The ordered list of messages the rest of the application observes.
// Mutation happens only through `append`, `update`, and `clear`.
// Insertion order is chronological and never reordered. The only way
// a message leaves the transcript is a whole-transcript `clear`
// (used when switching conversations).

use tokio::sync::watch;

use crate::message::{Message, MessageUpdate};

/// Append-only message transcript with change notification.
///
/// Every mutation bumps a version counter published on a watch channel,
/// so observers (a UI, a persistence mirror) can re-read the cumulative
/// state without the transcript knowing about them.
pub struct Transcript {
    messages: Vec<Message>,
    version: u64,
    notify: watch::Sender<u64>,
}

impl Transcript {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            version: 0,
            notify,
        }
    }

    /// Subscribe to version bumps. The value is the current version;
    /// observers re-read `messages()` when it changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Place a message at the end of the transcript.
    ///
    /// At most one assistant message may be incomplete per conversation:
    /// the pipeline never interleaves two streams into one transcript.
    /// If an earlier incomplete assistant message exists for the same
    /// conversation, it is finalized with whatever content it holds
    /// before the new message is appended.
    pub fn append(&mut self, message: Message) {
        if !message.is_from_user && !message.is_complete {
            for existing in self.messages.iter_mut() {
                if !existing.is_from_user
                    && !existing.is_complete
                    && existing.conversation_id == message.conversation_id
                {
                    existing.is_complete = true;
                }
            }
        }
        self.messages.push(message);
        self.bump();
    }

    /// Merge partial fields into the message with the given id.
    ///
    /// No-op when the id is not present: the caller is expected to have
    /// created the message via `append` first. Content changes against a
    /// completed message are ignored, and `is_complete` never moves back
    /// to false.
    pub fn update(&mut self, id: &str, update: MessageUpdate) {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return;
        };

        let mut changed = false;

        if let Some(content) = update.content {
            if !msg.is_complete && msg.content != content {
                msg.content = content;
                changed = true;
            }
        }
        if let Some(conversation_id) = update.conversation_id {
            if msg.conversation_id != conversation_id {
                msg.conversation_id = conversation_id;
                changed = true;
            }
        }
        if update.is_complete == Some(true) && !msg.is_complete {
            msg.is_complete = true;
            changed = true;
        }

        if changed {
            self.bump();
        }
    }

    /// Whole-transcript reset. The only removal operation.
    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            self.messages.clear();
            self.bump();
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        // send_replace never fails, even with no live receivers.
        self.notify.send_replace(self.version);
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
