//! One analysis attempt: extraction, analysis, illustration and report
//! assembly under a single wall-clock budget.

pub mod context;
pub mod deadline;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::{log_line, PipelineContext, StatusWriter};
pub use deadline::Deadline;
pub use error::{ErrorKind, PipelineError, PipelineWarning};
pub use progress::{
    BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter, RecordingProgress,
};
pub use runner::Pipeline;
