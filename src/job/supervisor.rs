//! Drives jobs through the pipeline.
//!
//! ## Retry Strategy
//!
//! A job gets [`JobRetryPolicy::max_attempts`] full pipeline runs. Between
//! runs it waits `5 s × attempt`, resets progress to zero and says so in the
//! job message. Every attempt starts from extraction again; nothing is
//! carried over.
//!
//! Errors that another attempt cannot fix (unreadable input, an unknown
//! backend, bad configuration) fail the job at once.
//!
//! Cancellation always wins: if the flag is up when an attempt returns, the
//! job ends `Cancelled` whatever the attempt produced.
//!
//! [`JobRetryPolicy::max_attempts`]: crate::config::JobRetryPolicy

use super::{Job, JobId, JobRegistry, JobState, JobUpdate};
use crate::backend::BackendRegistry;
use crate::codec::{AudioCodec, FfmpegCodec};
use crate::config::{ConversionConfig, ConversionSettings};
use crate::convert::{run_pipeline, ConversionOutput, OutputTarget, PipelineContext, RunOutcome};
use crate::error::Pdf2AudioError;
use crate::pipeline::extract::{Extractor, PdfiumExtractor};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runs conversion jobs held in a shared [`JobRegistry`].
pub struct JobSupervisor {
    registry: Arc<JobRegistry>,
    backends: Arc<BackendRegistry>,
    extractor: Arc<dyn Extractor>,
    codec: Arc<dyn AudioCodec>,
    config: ConversionConfig,
}

impl JobSupervisor {
    /// Supervisor using pdfium for text and ffmpeg for MP3 output.
    pub fn new(
        registry: Arc<JobRegistry>,
        backends: Arc<BackendRegistry>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            registry,
            backends,
            extractor: Arc::new(PdfiumExtractor::new(config.password.clone())),
            codec: Arc::new(FfmpegCodec::new()),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn AudioCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Create a job for `document`, record its metadata and queue it.
    ///
    /// The job is left in `Processing`, ready for [`run`](Self::run).
    pub async fn enqueue(
        &self,
        document: impl Into<PathBuf>,
        settings: ConversionSettings,
    ) -> Result<JobId, Pdf2AudioError> {
        let document = document.into();
        let metadata = self.extractor.metadata(&document).await?;
        let id = self.registry.create(document);
        self.registry.mark_uploaded(id, metadata)?;
        self.registry.submit(id, settings)?;
        Ok(id)
    }

    /// Run the job to a terminal state and return its final snapshot.
    ///
    /// # Errors
    /// Only when the job is unknown or not in `Processing`. Conversion
    /// failures are recorded on the job, not returned.
    pub async fn run(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        let job = self.registry.get(id)?;
        if job.state != JobState::Processing {
            return Err(Pdf2AudioError::InvalidTransition {
                id,
                from: job.state.as_str(),
                to: JobState::Processing.as_str(),
            });
        }
        let cancel = self.registry.cancel_signal(id)?;
        info!("Job {}: starting conversion of {}", id, job.document.display());

        let backend = match self.backends.resolve(job.settings.backend.as_deref()) {
            Ok(b) => b,
            Err(e) => return self.finish_failed(id, &e.to_string(), 0),
        };
        let target = OutputTarget::for_document(
            &self.config.output_dir,
            &job.document,
            Some(&id.to_string()),
            self.codec.extension(),
        );
        let ctx = PipelineContext {
            extractor: self.extractor.as_ref(),
            backend: &backend,
            codec: self.codec.as_ref(),
            config: &self.config,
        };

        let policy = self.config.job_retry;
        let mut last_error = String::new();
        for attempt in 1..=policy.max_attempts {
            self.apply(id, JobUpdate::attempt(attempt));

            let high_water = Mutex::new(0.0_f64);
            let reporter = |fraction: f64, message: &str| {
                let fraction = {
                    let mut hw = high_water.lock();
                    *hw = hw.max(fraction);
                    *hw
                };
                self.report(id, fraction, message);
            };

            let result = run_pipeline(ctx, &job.document, &job.settings, &target, &reporter, &cancel).await;

            if cancel.is_cancelled() {
                return self.finish_cancelled(id);
            }
            match result {
                Ok(RunOutcome::Completed(output)) => return self.finish_completed(id, output),
                Ok(RunOutcome::Cancelled) => return self.finish_cancelled(id),
                Err(e) if !is_retryable(&e) => {
                    error!("Job {}: {}", id, e);
                    return self.finish_failed(id, &e.to_string(), attempt);
                }
                Err(e) => {
                    warn!(
                        "Job {}: attempt {}/{} failed: {}",
                        id, attempt, policy.max_attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < policy.max_attempts {
                        let wait = policy.delay_after(attempt);
                        let message = format!(
                            "Retrying conversion in {}s (attempt {}/{})",
                            wait.as_secs(),
                            attempt + 1,
                            policy.max_attempts
                        );
                        self.report(id, 0.0, &message);
                        if cancel.sleep(wait).await {
                            return self.finish_cancelled(id);
                        }
                    }
                }
            }
        }

        let err = Pdf2AudioError::PipelineFailed {
            attempts: policy.max_attempts,
            last_error: last_error.clone(),
        };
        error!("Job {}: {}", id, err);
        self.finish_failed_with(id, last_error, err.to_string(), policy.max_attempts)
    }

    /// Run the job on its own task.
    pub fn spawn(self: &Arc<Self>, id: JobId) -> JoinHandle<Result<Job, Pdf2AudioError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(id).await })
    }

    /// Cancel a running job.
    pub fn cancel(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        self.registry.cancel(id)
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Listeners only hear progress the registry accepted, so nothing
    /// follows a cancellation.
    fn report(&self, id: JobId, fraction: f64, message: &str) {
        if !self.apply(id, JobUpdate::progress(fraction, message)) {
            return;
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_progress(id, fraction, message);
        }
    }

    /// Best-effort update; a job cancelled or deleted underneath us is fine.
    /// Returns whether the update landed.
    fn apply(&self, id: JobId, update: JobUpdate) -> bool {
        match self.registry.update(id, update) {
            Ok(_) => true,
            Err(e) => {
                debug!("Job {}: update skipped: {}", id, e);
                false
            }
        }
    }

    fn finish_completed(&self, id: JobId, output: ConversionOutput) -> Result<Job, Pdf2AudioError> {
        info!(
            "Job {}: completed → {} ({:.0}s)",
            id,
            output.audio_path.display(),
            output.duration_secs
        );
        self.apply(id, JobUpdate::completed(output.clone()));
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_completed(id, &output);
        }
        self.registry.get(id)
    }

    fn finish_cancelled(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        info!("Job {}: cancelled", id);
        self.apply(id, JobUpdate::cancelled());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_cancelled(id);
        }
        self.registry.get(id)
    }

    fn finish_failed(&self, id: JobId, error: &str, attempts: u32) -> Result<Job, Pdf2AudioError> {
        self.finish_failed_with(id, error.to_string(), format!("Conversion failed: {error}"), attempts)
    }

    fn finish_failed_with(
        &self,
        id: JobId,
        error: String,
        message: String,
        attempts: u32,
    ) -> Result<Job, Pdf2AudioError> {
        let update = JobUpdate {
            attempts: Some(attempts),
            ..JobUpdate::failed(error.clone(), message)
        };
        self.apply(id, update);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_failed(id, &error);
        }
        self.registry.get(id)
    }
}

/// Whether another full attempt could succeed.
fn is_retryable(e: &Pdf2AudioError) -> bool {
    !(e.is_fatal_input()
        || matches!(
            e,
            Pdf2AudioError::BackendNotFound { .. }
                | Pdf2AudioError::InvalidConfig(_)
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentMetadata;
    use crate::progress::JobProgressCallback;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<String>>,
        cancelled: Mutex<usize>,
    }

    impl JobProgressCallback for Recorder {
        fn on_progress(&self, _job: JobId, _fraction: f64, message: &str) {
            self.progress.lock().push(message.to_string());
        }

        fn on_cancelled(&self, _job: JobId) {
            *self.cancelled.lock() += 1;
        }
    }

    fn supervisor_with(recorder: Arc<Recorder>) -> JobSupervisor {
        let config = ConversionConfig::builder()
            .progress_callback(recorder)
            .build()
            .unwrap();
        JobSupervisor::new(
            Arc::new(JobRegistry::new()),
            Arc::new(BackendRegistry::new()),
            config,
        )
    }

    fn processing_job(registry: &JobRegistry) -> JobId {
        let id = registry.create("book.pdf");
        registry.mark_uploaded(id, DocumentMetadata::default()).unwrap();
        registry.submit(id, ConversionSettings::default()).unwrap();
        id
    }

    #[test]
    fn progress_reaches_listeners_while_processing() {
        let recorder = Arc::new(Recorder::default());
        let supervisor = supervisor_with(Arc::clone(&recorder));
        let id = processing_job(supervisor.registry());

        supervisor.report(id, 0.5, "Synthesizing 4 chunks");
        assert_eq!(*recorder.progress.lock(), ["Synthesizing 4 chunks"]);
        assert_eq!(supervisor.registry().get(id).unwrap().progress, 0.5);
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn run_future_can_move_to_a_worker() {
        let supervisor = supervisor_with(Arc::new(Recorder::default()));
        let id = processing_job(supervisor.registry());
        assert_send(supervisor.run(id));
    }

    #[test]
    fn no_progress_after_cancellation() {
        let recorder = Arc::new(Recorder::default());
        let supervisor = supervisor_with(Arc::clone(&recorder));
        let id = processing_job(supervisor.registry());
        supervisor.cancel(id).unwrap();

        supervisor.report(id, 0.6, "Synthesized chunk 1/2");
        assert!(recorder.progress.lock().is_empty());

        let job = supervisor.finish_cancelled(id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(*recorder.cancelled.lock(), 1);
    }

    #[test]
    fn input_errors_are_not_retried() {
        assert!(!is_retryable(&Pdf2AudioError::FileNotFound {
            path: PathBuf::from("x.pdf")
        }));
        assert!(!is_retryable(&Pdf2AudioError::BackendNotFound {
            name: "azure".into(),
            available: "openai".into()
        }));
        assert!(is_retryable(&Pdf2AudioError::AssemblyFailed("decode".into())));
        assert!(is_retryable(&Pdf2AudioError::ExportFailed {
            path: PathBuf::from("out.mp3"),
            detail: "disk full".into()
        }));
    }
}
