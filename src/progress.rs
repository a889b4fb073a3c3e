//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the supervisor drives each job through the pipeline.
//!
//! Delivery is best-effort and at-least-once: a retried pipeline replays
//! its progress from zero.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2audio::{JobId, JobProgressCallback, ConversionConfig};
//! use std::sync::{Arc, Mutex};
//!
//! struct LastMessage(Mutex<String>);
//!
//! impl JobProgressCallback for LastMessage {
//!     fn on_progress(&self, _job: JobId, _fraction: f64, message: &str) {
//!         *self.0.lock().unwrap() = message.to_string();
//!     }
//! }
//!
//! let cb = Arc::new(LastMessage(Mutex::new(String::new())));
//! let config = ConversionConfig::builder()
//!     .progress_callback(cb as Arc<dyn JobProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::convert::ConversionOutput;
use crate::job::JobId;
use std::sync::Arc;

/// Called by the job supervisor as a job advances.
///
/// Implementations must be `Send + Sync`: several jobs run on separate
/// tasks and report through the same callback. All methods default to
/// no-ops so callers only override what they care about.
pub trait JobProgressCallback: Send + Sync {
    /// Called at each stage boundary and after every synthesized chunk.
    ///
    /// # Arguments
    /// * `job`     : the job reporting
    /// * `fraction`: overall progress in `[0, 1]`
    /// * `message` : human-readable stage description
    fn on_progress(&self, job: JobId, fraction: f64, message: &str) {
        let _ = (job, fraction, message);
    }

    /// Called once when the job finishes successfully.
    fn on_completed(&self, job: JobId, output: &ConversionOutput) {
        let _ = (job, output);
    }

    /// Called once when the job fails for good.
    fn on_failed(&self, job: JobId, error: &str) {
        let _ = (job, error);
    }

    /// Called once when the job stops because it was cancelled.
    fn on_cancelled(&self, job: JobId) {
        let _ = job;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        progress: AtomicUsize,
        failed: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl JobProgressCallback for Counting {
        fn on_progress(&self, _job: JobId, _fraction: f64, _message: &str) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed(&self, _job: JobId, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cancelled(&self, _job: JobId) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = JobId::new();
        cb.on_progress(id, 0.5, "Synthesizing");
        cb.on_failed(id, "boom");
        cb.on_cancelled(id);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb = Counting::default();
        let id = JobId::new();
        cb.on_progress(id, 0.1, "Extracting text");
        cb.on_progress(id, 0.2, "Filtering pages");
        cb.on_failed(id, "backend down");

        assert_eq!(cb.progress.load(Ordering::SeqCst), 2);
        assert_eq!(cb.failed.load(Ordering::SeqCst), 1);
        assert_eq!(cb.cancelled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_progress(JobId::new(), 1.0, "Done");
    }
}
