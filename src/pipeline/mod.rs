//! Pipeline stages for PDF-to-audiobook conversion.
//!
//! Each submodule implements one transformation step, so each can be tested
//! alone and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ classify ──▶ segment ──▶ classify ──▶ chunk ──▶ synthesize ──▶ assemble
//! (pdfium)    (pages)      (chapters)  (sections)   (text)    (TTS API)      (PCM → MP3)
//! ```
//!
//! 1. [`extract`]   : metadata and per-page text; pdfium runs in `spawn_blocking`
//! 2. [`classify`]  : drop boilerplate pages, then boilerplate sections
//! 3. [`segment`]   : group pages under chapter headings
//! 4. [`chunk`]     : bounded, sentence-aligned narration chunks
//! 5. [`synthesize`]: rate-limited, retried, order-preserving TTS calls;
//!    the only stage with network I/O
//! 6. [`assemble`]  : decode, join with chapter pauses, tag and export
//!
//! Long-running stages take a [`CancelSignal`] and report
//! [`StageOutcome::Cancelled`] instead of an error when it fires.

pub mod assemble;
pub mod chunk;
pub mod classify;
pub mod extract;
pub mod segment;
pub mod synthesize;

use std::time::Duration;
use tokio::sync::watch;

/// Result of a stage that can be cancelled part-way.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Done(T),
    Cancelled,
}

/// Read side of a cooperative cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A flag and the sender that raises it.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A flag nobody can raise.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised; never resolves if it cannot be.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`. Returns `true` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancelled() => true,
        }
    }
}
