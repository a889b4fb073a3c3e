//! In-memory job store.
//!
//! Each entry pairs a [`Job`] with the sending half of its cancel flag.
//! Every state change goes through [`JobState::can_transition_to`], and a
//! job in a terminal state rejects all further updates.

use super::{Job, JobId, JobState};
use crate::config::ConversionSettings;
use crate::convert::ConversionOutput;
use crate::error::Pdf2AudioError;
use crate::model::DocumentMetadata;
use crate::pipeline::CancelSignal;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{debug, info};

struct Entry {
    job: Job,
    cancel: watch::Sender<bool>,
}

/// Partial update applied by [`JobRegistry::update`]. Unset fields are
/// left alone.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub output: Option<ConversionOutput>,
    pub attempts: Option<u32>,
}

impl JobUpdate {
    pub fn progress(fraction: f64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(fraction),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn attempt(attempt: u32) -> Self {
        Self {
            attempts: Some(attempt),
            ..Default::default()
        }
    }

    pub fn completed(output: ConversionOutput) -> Self {
        Self {
            state: Some(JobState::Completed),
            progress: Some(1.0),
            message: Some("Conversion completed successfully".to_string()),
            output: Some(output),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failed),
            error: Some(error.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            state: Some(JobState::Cancelled),
            message: Some("Conversion cancelled".to_string()),
            ..Default::default()
        }
    }
}

/// Thread-safe map of jobs. Share it as `Arc<JobRegistry>`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job for `document`, in `Created`.
    pub fn create(&self, document: impl Into<PathBuf>) -> JobId {
        let job = Job::new(document.into());
        let id = job.id;
        let (cancel, _) = watch::channel(false);
        debug!("Job {} created for {}", id, job.document.display());
        self.jobs.write().insert(id, Entry { job, cancel });
        id
    }

    /// `Created → Uploaded`, recording the document's metadata.
    pub fn mark_uploaded(&self, id: JobId, metadata: DocumentMetadata) -> Result<Job, Pdf2AudioError> {
        let pages = metadata.page_count;
        self.modify(id, |job| {
            transition(job, JobState::Uploaded)?;
            job.metadata = Some(metadata);
            job.message = format!("Uploaded ({pages} pages)");
            Ok(())
        })
    }

    /// `Uploaded → Processing` with the settings for this conversion.
    pub fn submit(&self, id: JobId, settings: ConversionSettings) -> Result<Job, Pdf2AudioError> {
        self.modify(id, |job| {
            transition(job, JobState::Processing)?;
            job.settings = settings;
            job.progress = 0.0;
            job.message = "Queued for conversion".to_string();
            Ok(())
        })
    }

    pub fn get(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        self.jobs
            .read()
            .get(&id)
            .map(|e| e.job.clone())
            .ok_or(Pdf2AudioError::JobNotFound(id))
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Apply `update`. Rejected once the job is terminal, and when the
    /// requested state is not reachable from the current one.
    pub fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, Pdf2AudioError> {
        self.modify(id, |job| {
            if let Some(next) = update.state {
                if next != job.state {
                    transition(job, next)?;
                }
            }
            if let Some(p) = update.progress {
                job.progress = p.clamp(0.0, 1.0);
            }
            if let Some(m) = update.message {
                job.message = m;
            }
            if let Some(e) = update.error {
                job.error = Some(e);
            }
            if let Some(o) = update.output {
                job.output = Some(o);
            }
            if let Some(a) = update.attempts {
                job.attempts = a;
            }
            Ok(())
        })
    }

    /// Cancel a running job: raises its flag and moves it to `Cancelled`.
    pub fn cancel(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(&id).ok_or(Pdf2AudioError::JobNotFound(id))?;
        transition(&mut entry.job, JobState::Cancelled)?;
        entry.job.message = "Conversion cancelled".to_string();
        entry.job.updated_at = Utc::now();
        entry.cancel.send_replace(true);
        info!("Job {} cancelled", id);
        Ok(entry.job.clone())
    }

    /// Remove a job in any state. A running job sees its flag raised.
    pub fn delete(&self, id: JobId) -> Result<Job, Pdf2AudioError> {
        let entry = self
            .jobs
            .write()
            .remove(&id)
            .ok_or(Pdf2AudioError::JobNotFound(id))?;
        entry.cancel.send_replace(true);
        debug!("Job {} deleted", id);
        Ok(entry.job)
    }

    /// The job's cancel flag.
    pub fn cancel_signal(&self, id: JobId) -> Result<CancelSignal, Pdf2AudioError> {
        self.jobs
            .read()
            .get(&id)
            .map(|e| CancelSignal::from_receiver(e.cancel.subscribe()))
            .ok_or(Pdf2AudioError::JobNotFound(id))
    }

    fn modify(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<(), Pdf2AudioError>,
    ) -> Result<Job, Pdf2AudioError> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(&id).ok_or(Pdf2AudioError::JobNotFound(id))?;
        if entry.job.state.is_terminal() {
            return Err(Pdf2AudioError::JobFinalized {
                id,
                state: entry.job.state.as_str(),
            });
        }
        let mut draft = entry.job.clone();
        f(&mut draft)?;
        draft.updated_at = Utc::now();
        entry.job = draft;
        Ok(entry.job.clone())
    }
}

fn transition(job: &mut Job, next: JobState) -> Result<(), Pdf2AudioError> {
    if job.state.is_terminal() {
        return Err(Pdf2AudioError::JobFinalized {
            id: job.id,
            state: job.state.as_str(),
        });
    }
    if !job.state.can_transition_to(next) {
        return Err(Pdf2AudioError::InvalidTransition {
            id: job.id,
            from: job.state.as_str(),
            to: next.as_str(),
        });
    }
    job.state = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing(registry: &JobRegistry) -> JobId {
        let id = registry.create("/uploads/book.pdf");
        registry.mark_uploaded(id, DocumentMetadata::default()).unwrap();
        registry.submit(id, ConversionSettings::default()).unwrap();
        id
    }

    #[test]
    fn lifecycle_reaches_processing() {
        let registry = JobRegistry::new();
        let id = processing(&registry);
        let job = registry.get(id).unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert!(job.metadata.is_some());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn submit_before_upload_is_rejected() {
        let registry = JobRegistry::new();
        let id = registry.create("/uploads/book.pdf");
        let err = registry.submit(id, ConversionSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::InvalidTransition {
                from: "created",
                to: "processing",
                ..
            }
        ));
        assert_eq!(registry.get(id).unwrap().state, JobState::Created);
    }

    #[test]
    fn cancel_only_while_processing() {
        let registry = JobRegistry::new();
        let id = registry.create("/uploads/book.pdf");
        assert!(registry.cancel(id).is_err());

        registry.mark_uploaded(id, DocumentMetadata::default()).unwrap();
        registry.submit(id, ConversionSettings::default()).unwrap();
        let signal = registry.cancel_signal(id).unwrap();
        assert!(!signal.is_cancelled());

        let job = registry.cancel(id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(signal.is_cancelled());
    }

    #[test]
    fn terminal_jobs_reject_updates() {
        let registry = JobRegistry::new();
        let id = processing(&registry);
        registry.update(id, JobUpdate::failed("boom", "Conversion failed")).unwrap();

        let err = registry.update(id, JobUpdate::progress(0.5, "late")).unwrap_err();
        assert!(matches!(err, Pdf2AudioError::JobFinalized { state: "failed", .. }));
        assert!(matches!(registry.cancel(id), Err(Pdf2AudioError::JobFinalized { .. })));
        assert_eq!(registry.get(id).unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let registry = JobRegistry::new();
        let id = registry.create("/uploads/book.pdf");
        let update = JobUpdate {
            state: Some(JobState::Completed),
            message: Some("should not stick".into()),
            ..Default::default()
        };
        assert!(registry.update(id, update).is_err());
        assert_eq!(registry.get(id).unwrap().message, "Waiting for upload");
    }

    #[test]
    fn progress_is_clamped() {
        let registry = JobRegistry::new();
        let id = processing(&registry);
        let job = registry.update(id, JobUpdate::progress(1.7, "over")).unwrap();
        assert_eq!(job.progress, 1.0);
    }

    #[test]
    fn delete_raises_flag_and_evicts() {
        let registry = JobRegistry::new();
        let id = processing(&registry);
        let signal = registry.cancel_signal(id).unwrap();
        registry.delete(id).unwrap();
        assert!(signal.is_cancelled());
        assert!(matches!(registry.get(id), Err(Pdf2AudioError::JobNotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let registry = JobRegistry::new();
        let ghost = JobId::new();
        assert!(matches!(registry.get(ghost), Err(Pdf2AudioError::JobNotFound(_))));
        assert!(matches!(registry.cancel_signal(ghost), Err(Pdf2AudioError::JobNotFound(_))));
    }
}
