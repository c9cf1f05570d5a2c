pub mod job;
pub mod pool;
pub mod status;

pub use job::{AnalysisMode, Domain, JobConfig, JobResult, Locale, ReportStyle};
pub use pool::{ActiveJobs, WorkerPool};
pub use status::JobStatus;
