//! Speech synthesis: turn text chunks into audio through a backend.
//!
//! ## Retry Strategy
//!
//! Each chunk gets [`ChunkRetryPolicy::max_attempts`] tries. After failed
//! attempt *k* the chunk waits `base_delay × 2^(k-1)` (2 s, then 4 s with
//! the defaults); the last failure escalates as
//! [`Pdf2AudioError::SynthesisFailed`] carrying the final cause.
//!
//! Every attempt first passes the backend's shared [`RateLimiter`], so
//! concurrent jobs on the same backend stay inside its quota together.
//!
//! [`RateLimiter`]: crate::backend::RateLimiter

use super::{CancelSignal, StageOutcome};
use crate::backend::{RegisteredBackend, SpeechRequest};
use crate::config::{ChunkRetryPolicy, ConversionSettings};
use crate::error::{BackendError, Pdf2AudioError};
use crate::model::{AudioChunk, TextChunk};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-chunk events emitted while synthesizing.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    ChunkStarted {
        index: usize,
        total: usize,
    },
    Retrying {
        index: usize,
        attempt: u32,
        max_attempts: u32,
        wait: Duration,
        error: String,
    },
    ChunkFinished {
        index: usize,
        total: usize,
    },
}

/// Receives [`SynthesisEvent`]s; called from concurrent chunk tasks.
pub type SynthesisObserver<'a> = &'a (dyn Fn(SynthesisEvent) + Send + Sync);

/// Drives chunk synthesis with bounded parallelism.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisOrchestrator {
    concurrency: usize,
    retry: ChunkRetryPolicy,
}

impl Default for SynthesisOrchestrator {
    fn default() -> Self {
        Self::new(3, ChunkRetryPolicy::default())
    }
}

impl SynthesisOrchestrator {
    pub fn new(concurrency: usize, retry: ChunkRetryPolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// Synthesize every chunk, returning audio in chunk order.
    ///
    /// Stops at the first chunk that exhausts its retries; chunks still in
    /// flight are dropped. Cancellation is checked before each chunk and
    /// during every wait.
    pub async fn synthesize_all(
        &self,
        chunks: &[TextChunk],
        backend: &RegisteredBackend,
        settings: &ConversionSettings,
        observer: SynthesisObserver<'_>,
        cancel: &CancelSignal,
    ) -> Result<StageOutcome<Vec<AudioChunk>>, Pdf2AudioError> {
        let voice = settings
            .voice
            .clone()
            .unwrap_or_else(|| backend.backend.default_voice().to_string());
        let total = chunks.len();
        debug!(
            "Synthesizing {} chunks via {} (voice {}, {} in parallel)",
            total,
            backend.backend.name(),
            voice,
            self.concurrency
        );

        // Built eagerly: a lazy borrowing `map` here makes `JobSupervisor::spawn`
        // fail the higher-ranked `Send` check.
        let pending: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let request = SpeechRequest {
                    text: chunk.text.clone(),
                    voice: voice.clone(),
                    speed: settings.speed,
                };
                self.synthesize_chunk(chunk, request, total, backend, observer, cancel)
            })
            .collect();
        let mut results = std::pin::pin!(stream::iter(pending).buffered(self.concurrency));

        let mut audio = Vec::with_capacity(total);
        while let Some(result) = results.next().await {
            match result? {
                StageOutcome::Done(chunk) => audio.push(chunk),
                StageOutcome::Cancelled => return Ok(StageOutcome::Cancelled),
            }
        }
        Ok(StageOutcome::Done(audio))
    }

    async fn synthesize_chunk(
        &self,
        chunk: &TextChunk,
        request: SpeechRequest,
        total: usize,
        backend: &RegisteredBackend,
        observer: SynthesisObserver<'_>,
        cancel: &CancelSignal,
    ) -> Result<StageOutcome<AudioChunk>, Pdf2AudioError> {
        if cancel.is_cancelled() {
            return Ok(StageOutcome::Cancelled);
        }
        observer(SynthesisEvent::ChunkStarted {
            index: chunk.index,
            total,
        });

        let mut attempt = 1;
        loop {
            tokio::select! {
                _ = backend.limiter.acquire() => {}
                _ = cancel.cancelled() => return Ok(StageOutcome::Cancelled),
            }

            let result = match backend.backend.synthesize(&request).await {
                Ok(bytes) if bytes.is_empty() => Err(BackendError::EmptyAudio {
                    backend: backend.backend.name().to_string(),
                }),
                other => other,
            };

            match result {
                Ok(audio) => {
                    observer(SynthesisEvent::ChunkFinished {
                        index: chunk.index,
                        total,
                    });
                    return Ok(StageOutcome::Done(AudioChunk {
                        audio,
                        text: chunk.text.clone(),
                        chapter: chunk.chapter.clone(),
                        index: chunk.index,
                        duration_secs: None,
                    }));
                }
                Err(e) if attempt >= self.retry.max_attempts => {
                    warn!(
                        "Chunk {}: attempt {}/{} failed, giving up: {}",
                        chunk.index, attempt, self.retry.max_attempts, e
                    );
                    return Err(Pdf2AudioError::SynthesisFailed {
                        chunk: chunk.index,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let wait = self.retry.delay_after(attempt);
                    warn!(
                        "Chunk {}: attempt {}/{} failed, retrying in {:?}: {}",
                        chunk.index, attempt, self.retry.max_attempts, wait, e
                    );
                    observer(SynthesisEvent::Retrying {
                        index: chunk.index,
                        attempt,
                        max_attempts: self.retry.max_attempts,
                        wait,
                        error: e.to_string(),
                    });
                    if cancel.sleep(wait).await {
                        return Ok(StageOutcome::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
