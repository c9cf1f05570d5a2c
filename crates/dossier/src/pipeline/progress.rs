use std::sync::Mutex;

use crate::broadcast::JobProgressTracker;
use crate::worker::JobStatus;

use super::error::ErrorKind;

/// Events emitted by the pipeline during one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Status {
        status: JobStatus,
        message: String,
    },
    Completed {
        elapsed_ms: i64,
    },
    Failed {
        kind: ErrorKind,
        error: String,
        elapsed_ms: Option<i64>,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: JobProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status { status, message } => self.tracker.update(status, &message),
            ProgressEvent::Completed { elapsed_ms } => self.tracker.completed(elapsed_ms),
            ProgressEvent::Failed {
                kind,
                error,
                elapsed_ms,
            } => self.tracker.failed(kind, &error, elapsed_ms),
        }
    }
}

/// Keeps every event; used by tests to assert the visited states.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status { status, .. } => Some(status),
                ProgressEvent::Completed { .. } => Some(JobStatus::Completed),
                ProgressEvent::Failed { .. } => Some(JobStatus::Error),
            })
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => {
                log::warn!("Progress recorder lock poisoned, recovering");
                poisoned.into_inner().push(event);
            }
        }
    }
}
