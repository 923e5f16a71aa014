// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Streaming message pipeline: wire protocol, producer, reassembler
//
// Responsibilities:
// - Encode assistant replies as ordered SSE frames (content deltas,
//   one terminal sentinel or error per stream)
// - Reassemble frames into a transcript message while the transfer is
//   in flight, tolerating frames split across chunk boundaries
// - Guarantee every stream reaches a terminal state: sentinel, error
//   frame, disconnect fallback, or cooperative cancellation

mod consumer;
mod producer;
mod types;

pub use consumer::{CancelToken, ConsumerState, StreamConsumer, StreamOutcome, FALLBACK_NOTICE};
pub use producer::{ProducerConfig, StreamProducer};
pub use types::{parse_sse_line, word_increments, Frame, FrameError};
