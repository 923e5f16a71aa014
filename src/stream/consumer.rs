// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Stream consumer / reassembler
//
// Reads raw bytes off the response body, splits them into SSE lines,
// parses frames, and folds content deltas into the pending assistant
// message of a transcript. Chunk boundaries do not align with frame
// boundaries, or even with UTF-8 character boundaries: partial lines
// are buffered as raw bytes and decoded only once the newline arrives.
//
// Every path through the state machine reaches Terminal. If the
// transport closes or errors before a terminal frame, the message is
// finalized with a fallback notice so the transcript never holds a
// permanently in-progress message.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_stream::{Stream, StreamExt};

use super::types::{parse_sse_line, Frame};
use crate::message::MessageUpdate;
use crate::transcript::Transcript;

/// Appended to whatever content was accumulated when a stream dies
/// without a terminal frame or reports a generation error.
pub const FALLBACK_NOTICE: &str =
    "Sorry, something went wrong while generating the response. Please try again.";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Reassembly state for one in-flight stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Constructed, request not yet driven.
    Idle,
    /// Request sent, no bytes received yet.
    Awaiting,
    /// At least one chunk received, folding deltas.
    Accumulating,
    /// Terminal frame observed, transport closed, or cancelled.
    Terminal,
}

/// How a stream reached Terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// Sentinel observed; the reply is complete.
    Completed,
    /// Error frame observed; the message was finalized with the
    /// fallback notice.
    Failed(String),
    /// Transport closed or errored before any terminal frame; the
    /// message was finalized with the fallback notice.
    Disconnected,
    /// Cooperative cancellation; the message was finalized with the
    /// content accumulated so far, no fallback appended.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal, checked before each transport read.
/// Cloning shares the flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// StreamConsumer
// ---------------------------------------------------------------------------

/// Reassembles one assistant message from a frame stream.
///
/// The consumer is handed the id of a pending assistant message that the
/// caller has already appended to the transcript; it is the only writer
/// to that message while the stream is in flight.
pub struct StreamConsumer {
    state: ConsumerState,
    message_id: String,
    line_buffer: Vec<u8>,
    accumulated: String,
    cancel: CancelToken,
}

impl StreamConsumer {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self::with_cancel(message_id, CancelToken::new())
    }

    pub fn with_cancel(message_id: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            state: ConsumerState::Idle,
            message_id: message_id.into(),
            line_buffer: Vec::new(),
            accumulated: String::new(),
            cancel,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Drive the transport to completion, folding frames into the
    /// transcript. Consumes the consumer: a stream is read exactly
    /// once, which is what makes replay into a fresh consumer
    /// idempotent.
    pub async fn run<S, E>(mut self, mut input: S, transcript: &mut Transcript) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        self.state = ConsumerState::Awaiting;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(transcript);
            }

            match input.next().await {
                Some(Ok(chunk)) => {
                    if self.cancel.is_cancelled() {
                        // Cancelled while we were waiting; the chunk is
                        // discarded, not folded in.
                        return self.finish_cancelled(transcript);
                    }
                    self.state = ConsumerState::Accumulating;
                    self.line_buffer.extend_from_slice(&chunk);
                    if let Some(outcome) = self.drain_lines(transcript) {
                        self.state = ConsumerState::Terminal;
                        return outcome;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport error mid-stream");
                    return self.finish_disconnected(transcript);
                }
                None => {
                    // Flush a trailing line the producer never terminated.
                    if !self.line_buffer.is_empty() {
                        let bytes = std::mem::take(&mut self.line_buffer);
                        let line = String::from_utf8_lossy(&bytes).into_owned();
                        if let Some(outcome) = self.process_line(&line, transcript) {
                            self.state = ConsumerState::Terminal;
                            return outcome;
                        }
                    }
                    return self.finish_disconnected(transcript);
                }
            }
        }
    }

    /// Process every complete line currently buffered. Decoding happens
    /// per complete line: a newline byte never falls inside a UTF-8
    /// sequence, so a multi-byte character split across chunks is whole
    /// again by the time its line is decoded. Returns the outcome once
    /// a terminal frame is observed.
    fn drain_lines(&mut self, transcript: &mut Transcript) -> Option<StreamOutcome> {
        while let Some(newline_pos) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let bytes: Vec<u8> = self.line_buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&bytes);
            if let Some(outcome) = self.process_line(&line, transcript) {
                return Some(outcome);
            }
        }
        None
    }

    fn process_line(&mut self, line: &str, transcript: &mut Transcript) -> Option<StreamOutcome> {
        let payload = parse_sse_line(line)?;

        match Frame::parse_payload(payload) {
            Ok(Frame::ContentDelta(delta)) => {
                self.accumulated.push_str(&delta);
                transcript.update(
                    &self.message_id,
                    MessageUpdate::content(self.accumulated.clone()),
                );
                None
            }
            Ok(Frame::StreamEnd) => {
                tracing::debug!(
                    message_id = %self.message_id,
                    chars = self.accumulated.len(),
                    "stream completed"
                );
                transcript.update(&self.message_id, MessageUpdate::complete());
                Some(StreamOutcome::Completed)
            }
            Ok(Frame::StreamError(reason)) => {
                transcript.update(
                    &self.message_id,
                    MessageUpdate::finish(self.with_fallback()),
                );
                Some(StreamOutcome::Failed(reason))
            }
            Err(e) => {
                // A single malformed frame never aborts the stream.
                tracing::warn!(error = %e, line = line.trim(), "skipping malformed frame");
                None
            }
        }
    }

    fn finish_disconnected(&mut self, transcript: &mut Transcript) -> StreamOutcome {
        self.state = ConsumerState::Terminal;
        transcript.update(
            &self.message_id,
            MessageUpdate::finish(self.with_fallback()),
        );
        StreamOutcome::Disconnected
    }

    fn finish_cancelled(&mut self, transcript: &mut Transcript) -> StreamOutcome {
        self.state = ConsumerState::Terminal;
        // Keep the last fully-processed content as final; cancellation
        // must not leave the message perma-incomplete.
        transcript.update(&self.message_id, MessageUpdate::complete());
        StreamOutcome::Cancelled
    }

    fn with_fallback(&self) -> String {
        if self.accumulated.is_empty() {
            FALLBACK_NOTICE.to_string()
        } else {
            format!("{}\n\n{FALLBACK_NOTICE}", self.accumulated)
        }
    }
}
