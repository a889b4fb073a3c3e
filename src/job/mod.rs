//! Conversion jobs: identity, lifecycle and bookkeeping.
//!
//! ```text
//! Created ──▶ Uploaded ──▶ Processing ──┬──▶ Completed
//!                                       ├──▶ Failed
//!                                       └──▶ Cancelled
//! ```
//!
//! [`JobRegistry`] owns every job and its cancel flag; [`JobSupervisor`]
//! drives one job through the pipeline with a top-level retry.

pub mod registry;
pub mod supervisor;

pub use registry::{JobRegistry, JobUpdate};
pub use supervisor::JobSupervisor;

use crate::config::ConversionSettings;
use crate::convert::ConversionOutput;
use crate::model::DocumentMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Uploaded,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether `self → next` is an edge of the lifecycle.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Uploaded)
                | (Uploaded, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Uploaded => "uploaded",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// The uploaded PDF on local storage.
    pub document: PathBuf,
    /// Known once the upload has been inspected.
    pub metadata: Option<DocumentMetadata>,
    pub settings: ConversionSettings,
    pub state: JobState,
    /// Overall progress in `[0, 1]`.
    pub progress: f64,
    pub message: String,
    pub error: Option<String>,
    pub output: Option<ConversionOutput>,
    /// Pipeline attempts started so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(document: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            document,
            metadata: None,
            settings: ConversionSettings::default(),
            state: JobState::Created,
            progress: 0.0,
            message: "Waiting for upload".to_string(),
            error: None,
            output: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 6] = [
        JobState::Created,
        JobState::Uploaded,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    #[test]
    fn terminal_states_accept_nothing() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} → {to}");
            }
        }
    }

    #[test]
    fn cancelled_only_from_processing() {
        let sources: Vec<JobState> = ALL
            .into_iter()
            .filter(|s| s.can_transition_to(JobState::Cancelled))
            .collect();
        assert_eq!(sources, vec![JobState::Processing]);
    }

    #[test]
    fn happy_path_edges() {
        assert!(JobState::Created.can_transition_to(JobState::Uploaded));
        assert!(JobState::Uploaded.can_transition_to(JobState::Processing));
        assert!(JobState::Processing.can_transition_to(JobState::Completed));
        assert!(!JobState::Created.can_transition_to(JobState::Processing));
        assert!(!JobState::Processing.can_transition_to(JobState::Processing));
    }

    #[test]
    fn job_id_parses_its_display() {
        let id = JobId::new();
        let back: JobId = id.to_string().parse().unwrap();
        assert_eq!(back, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobState::Processing).unwrap(), "\"processing\"");
    }
}
