//! Broadcasting of job progress for live subscribers (CLI, embedding
//! applications).

pub mod job_progress;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobProgressTracker};
