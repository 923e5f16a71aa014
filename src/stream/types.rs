// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Wire protocol types
//
// One frame per SSE event: a `data: ` prefixed line carrying either a
// JSON content delta, a JSON error descriptor, or the literal `[DONE]`
// sentinel, terminated by a blank line. Frames are delivered and
// consumed strictly in send order; the transport (a reliable byte
// stream) guarantees ordering, and no reordering or coalescing logic
// exists on either side.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// SSE line prefix for every frame.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Terminal sentinel payload signaling end-of-stream.
pub const SSE_DONE: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One discrete unit of the streaming wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Incremental assistant text. Concatenating every delta of a
    /// stream, in order, reconstructs the reply exactly.
    ContentDelta(String),
    /// Terminal sentinel: the reply is complete.
    StreamEnd,
    /// Terminal error descriptor; the producer closes the transport
    /// immediately after emitting it.
    StreamError(String),
}

/// JSON shape shared by delta and error payloads.
#[derive(Serialize, Deserialize)]
struct WirePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Frame {
    /// Encode as one SSE event: `data: <payload>` plus the blank-line
    /// terminator.
    pub fn encode(&self) -> Bytes {
        let payload = match self {
            Frame::StreamEnd => SSE_DONE.to_string(),
            Frame::ContentDelta(content) => serde_json::json!({ "content": content }).to_string(),
            Frame::StreamError(error) => serde_json::json!({ "error": error }).to_string(),
        };
        Bytes::from(format!("{SSE_DATA_PREFIX}{payload}\n\n"))
    }

    /// Parse the payload of one `data:` line.
    pub fn parse_payload(data: &str) -> Result<Frame, FrameError> {
        let data = data.trim();
        if data == SSE_DONE {
            return Ok(Frame::StreamEnd);
        }

        let payload: WirePayload = serde_json::from_str(data)
            .map_err(|e| FrameError::MalformedPayload(e.to_string()))?;

        match (payload.content, payload.error) {
            (Some(content), _) => Ok(Frame::ContentDelta(content)),
            (None, Some(error)) => Ok(Frame::StreamError(error)),
            (None, None) => Err(FrameError::UnknownShape),
        }
    }

    /// True for the two payloads that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::StreamEnd | Frame::StreamError(_))
    }
}

/// A single malformed frame. Recovered per-frame: the consumer logs and
/// skips the line, and the stream continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload is not valid JSON: {0}")]
    MalformedPayload(String),

    #[error("frame payload carries neither content nor error")]
    UnknownShape,
}

// ---------------------------------------------------------------------------
// SSE line parsing
// ---------------------------------------------------------------------------

/// Extract the payload from a raw SSE line.
///
/// Returns the text after the `data:` prefix, or `None` for blank
/// separator lines, comment lines, and anything else that is not a
/// data line.
pub fn parse_sse_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    trimmed
        .strip_prefix(SSE_DATA_PREFIX)
        .or_else(|| trimmed.strip_prefix("data:"))
}

// ---------------------------------------------------------------------------
// Word increments
// ---------------------------------------------------------------------------

/// Split reply text into word-sized increments, each word keeping its
/// trailing whitespace run, so that concatenating the increments in
/// order reproduces the input byte-for-byte. Leading whitespace becomes
/// its own increment.
pub fn word_increments(text: &str) -> Vec<String> {
    let mut increments = Vec::new();
    let mut current = String::new();
    let mut in_trailing_ws = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            current.push(ch);
            in_trailing_ws = true;
        } else {
            if in_trailing_ws {
                increments.push(std::mem::take(&mut current));
                in_trailing_ws = false;
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        increments.push(current);
    }
    increments
}
