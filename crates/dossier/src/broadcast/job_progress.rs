//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::ErrorKind;
use crate::worker::JobStatus;

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Status the job just entered.
    pub status: JobStatus,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Failure category (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent in the attempt (set once it ends).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, status: JobStatus, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
            error_kind: None,
            error: None,
            elapsed_ms: None,
        }
    }

    pub fn completed(job_id: &str, elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms: Some(elapsed_ms),
            ..Self::new(job_id, JobStatus::Completed, "Report ready")
        }
    }

    pub fn failed(job_id: &str, kind: ErrorKind, error: &str, elapsed_ms: Option<i64>) -> Self {
        Self {
            error_kind: Some(kind),
            error: Some(error.to_string()),
            elapsed_ms,
            ..Self::new(job_id, JobStatus::Error, "Analysis failed")
        }
    }

    /// Terminal events end a subscriber's interest in the job.
    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job attempt.
    pub fn track(&self, job_id: &str) -> JobProgressTracker {
        JobProgressTracker::new(job_id, Arc::clone(&self.sender))
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_id: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(job_id: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            sender,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn update(&self, status: JobStatus, message: &str) {
        let _ = self
            .sender
            .send(JobProgressEvent::new(&self.job_id, status, message));
    }

    pub fn completed(&self, elapsed_ms: i64) {
        let _ = self
            .sender
            .send(JobProgressEvent::completed(&self.job_id, elapsed_ms));
    }

    pub fn failed(&self, kind: ErrorKind, error: &str, elapsed_ms: Option<i64>) {
        let _ = self.sender.send(JobProgressEvent::failed(
            &self.job_id,
            kind,
            error,
            elapsed_ms,
        ));
    }
}
