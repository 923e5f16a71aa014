// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Generation service abstraction
//
// The pipeline never talks to a concrete model backend. The producer
// holds an `Arc<dyn Generator>`; implementations may return the whole
// reply at once or feed fragments through a channel, and the producer
// must tolerate either.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Errors surfaced by a generation backend. The producer converts these
/// into a single error frame; they never escape the request.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generation backend failed: {0}")]
    Backend(String),
}

/// A reply from the generation service.
pub enum Reply {
    /// The full reply text, available up front. The producer splits it
    /// into word increments itself.
    Complete(String),
    /// Fragments arriving as the backend produces them, in order.
    /// Channel close signals the end of the reply.
    Incremental(mpsc::Receiver<String>),
}

/// Abstraction over whatever produces assistant reply text.
///
/// Implementations must be Send + Sync so they can be shared across
/// request handlers via `Arc`.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Reply, GenerateError>;
}

// ---------------------------------------------------------------------------
// CannedGenerator
// ---------------------------------------------------------------------------

/// Stand-in generation service producing templated replies.
///
/// Used until a real backend is wired in, and as the default for local
/// runs. Template choice is derived from the prompt so replies are
/// stable for a given input.
pub struct CannedGenerator;

const TEMPLATES: [&str; 4] = [
    "Thanks for your question: \"{q}\". Let me share how I see it.",
    "\"{q}\" is an interesting topic. Here is a closer look.",
    "Your question \"{q}\" touches on an important idea. One way to think about it:",
    "On \"{q}\", there are a few angles worth considering.",
];

const CLOSINGS: [&str; 3] = [
    "Every challenge is also an opportunity to learn something new.",
    "Understanding the question deeply is usually half of the answer.",
    "Small, consistent steps tend to beat occasional big ones.",
];

impl CannedGenerator {
    pub fn new() -> Self {
        Self
    }

    fn compose(&self, prompt: &str) -> String {
        let opening = TEMPLATES[prompt.len() % TEMPLATES.len()].replace("{q}", prompt);
        let closing = CLOSINGS[prompt.chars().count() % CLOSINGS.len()];
        format!("{opening}\n\n{closing}\n\nI hope this helps. Feel free to ask a follow-up.")
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Reply, GenerateError> {
        Ok(Reply::Complete(self.compose(prompt)))
    }
}
