//! Job events as a `Stream`.
//!
//! [`ChannelProgress`] is a [`JobProgressCallback`] that forwards every
//! event into an unbounded channel. The receiving side is a
//! [`JobEventStream`], ready to feed a WebSocket, an SSE endpoint or a
//! terminal UI. Events serialize to JSON tagged by `event`:
//!
//! ```json
//! {"event":"progress","job_id":"…","progress":0.4,"message":"Prepared 12 chunks"}
//! ```
//!
//! Events from all jobs share one stream; use [`only_job`] to follow one.

use crate::convert::ConversionOutput;
use crate::job::JobId;
use crate::progress::JobProgressCallback;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// One lifecycle event of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        progress: f64,
        message: String,
    },
    Completed {
        job_id: JobId,
        output: ConversionOutput,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => *job_id,
        }
    }

    /// `true` for the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// A boxed stream of job events.
pub type JobEventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Progress callback that publishes into a [`JobEventStream`].
///
/// Sends never block. Once the stream is dropped, events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, JobEventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn send(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

impl JobProgressCallback for ChannelProgress {
    fn on_progress(&self, job: JobId, fraction: f64, message: &str) {
        self.send(JobEvent::Progress {
            job_id: job,
            progress: fraction,
            message: message.to_string(),
        });
    }

    fn on_completed(&self, job: JobId, output: &ConversionOutput) {
        self.send(JobEvent::Completed {
            job_id: job,
            output: output.clone(),
        });
    }

    fn on_failed(&self, job: JobId, error: &str) {
        self.send(JobEvent::Failed {
            job_id: job,
            error: error.to_string(),
        });
    }

    fn on_cancelled(&self, job: JobId) {
        self.send(JobEvent::Cancelled { job_id: job });
    }
}

/// Keep only the events of `job`.
pub fn only_job(stream: JobEventStream, job: JobId) -> JobEventStream {
    Box::pin(stream.filter(move |e| e.job_id() == job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callbacks_arrive_in_order() {
        let (progress, stream) = ChannelProgress::new();
        let id = JobId::new();
        progress.on_progress(id, 0.1, "Extracted 3 pages");
        progress.on_failed(id, "backend down");
        drop(progress);

        let events: Vec<JobEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_terminal());
        assert_eq!(
            events[1],
            JobEvent::Failed {
                job_id: id,
                error: "backend down".into()
            }
        );
    }

    #[tokio::test]
    async fn filter_by_job() {
        let (progress, stream) = ChannelProgress::new();
        let (a, b) = (JobId::new(), JobId::new());
        progress.on_progress(a, 0.1, "a");
        progress.on_progress(b, 0.1, "b");
        progress.on_cancelled(a);
        drop(progress);

        let events: Vec<JobEvent> = only_job(stream, a).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.job_id() == a));
    }

    #[test]
    fn events_serialize_with_tag() {
        let id = JobId::new();
        let json = serde_json::to_value(JobEvent::Cancelled { job_id: id }).unwrap();
        assert_eq!(json["event"], "cancelled");
        assert_eq!(json["job_id"], id.to_string());
    }

    #[test]
    fn sending_after_stream_dropped_is_silent() {
        let (progress, stream) = ChannelProgress::new();
        drop(stream);
        progress.on_progress(JobId::new(), 0.5, "nobody listening");
    }
}
