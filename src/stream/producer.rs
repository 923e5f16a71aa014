// Stream producer
//
// Turns one admitted user message into a sequence of SSE frames on a
// long-lived response body. A spawned task drives the generation
// service and writes encoded frames into an mpsc channel; the receiver
// side is the response byte stream.
//
// Guarantee: exactly one terminal frame (sentinel or error) is emitted
// on every path, and the channel is always closed by the producer. The
// only exception is the receiver being dropped (client gone), in which
// case the task stops writing immediately.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use super::types::{word_increments, Frame};
use crate::generate::{Generator, Reply};

/// Producer pacing and timeout policy.
///
/// The pacing delay produces the perceptible "typing" effect between
/// increments. Its exact value is not contractual; only ordering and
/// exhaustiveness of the increments are. Tests run with zero pacing.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub pacing: Duration,
    /// Ceiling on waiting for the generation service, for the whole
    /// reply in the complete case and per fragment in the incremental
    /// case. On expiry the producer still emits a terminal error frame
    /// rather than hanging.
    pub generation_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(50),
            generation_timeout: Duration::from_secs(30),
        }
    }
}

impl ProducerConfig {
    /// Zero pacing, short timeout. For tests and benchmarks.
    pub fn immediate() -> Self {
        Self {
            pacing: Duration::ZERO,
            generation_timeout: Duration::from_secs(5),
        }
    }
}

/// Produces the frame stream for one assistant reply.
pub struct StreamProducer {
    generator: Arc<dyn Generator>,
    config: ProducerConfig,
}

impl StreamProducer {
    pub fn new(generator: Arc<dyn Generator>, config: ProducerConfig) -> Self {
        Self { generator, config }
    }

    /// Start producing frames for the given sanitized message.
    ///
    /// Returns the byte stream to use as the response body. The
    /// producing task runs until the terminal frame is sent or the
    /// receiver is dropped.
    pub fn produce(&self, message: String) -> impl Stream<Item = Bytes> + Send {
        let generator = self.generator.clone();
        let config = self.config.clone();
        let (tx, rx) = mpsc::channel::<Bytes>(64);

        tokio::spawn(async move {
            let reply =
                match tokio::time::timeout(config.generation_timeout, generator.generate(&message))
                    .await
                {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "generation failed");
                        let _ = tx.send(Frame::StreamError(e.to_string()).encode()).await;
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = config.generation_timeout.as_millis() as u64,
                            "generation timed out"
                        );
                        let _ = tx
                            .send(Frame::StreamError("generation timed out".to_string()).encode())
                            .await;
                        return;
                    }
                };

            match reply {
                Reply::Complete(text) => {
                    for increment in word_increments(&text) {
                        if tx.send(Frame::ContentDelta(increment).encode()).await.is_err() {
                            return; // client disconnected
                        }
                        if !config.pacing.is_zero() {
                            tokio::time::sleep(config.pacing).await;
                        }
                    }
                }
                Reply::Incremental(mut fragments) => {
                    loop {
                        match tokio::time::timeout(config.generation_timeout, fragments.recv())
                            .await
                        {
                            Ok(Some(fragment)) => {
                                if tx.send(Frame::ContentDelta(fragment).encode()).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(_) => {
                                tracing::warn!("generation fragment stream stalled");
                                let _ = tx
                                    .send(
                                        Frame::StreamError(
                                            "generation timed out".to_string(),
                                        )
                                        .encode(),
                                    )
                                    .await;
                                return;
                            }
                        }
                    }
                }
            }

            let _ = tx.send(Frame::StreamEnd.encode()).await;
        });

        ReceiverStream::new(rx)
    }
}
