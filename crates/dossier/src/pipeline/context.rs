use std::sync::{Arc, Mutex};

use crate::db::document_repo::DocumentRow;
use crate::db::{self, job_repo, Database};
use crate::engine::{Reference, ResearchPlan};
use crate::report::Figure;
use crate::worker::{AnalysisMode, JobConfig, JobStatus};

use super::deadline::Deadline;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};

/// `[HH:MM:SS] message`, the processing log line format.
pub fn log_line(message: &str) -> String {
    format!("[{}] {}\n", chrono::Local::now().format("%H:%M:%S"), message)
}

/// Sole writer of one job's status during an attempt.
///
/// Clones share the current status, so the search observer and the stage
/// code agree on where the job is.
#[derive(Clone)]
pub struct StatusWriter {
    db: Database,
    job_id: String,
    deadline: Deadline,
    current: Arc<Mutex<JobStatus>>,
    progress: Arc<dyn ProgressReporter>,
}

impl StatusWriter {
    pub fn new(
        db: Database,
        job_id: &str,
        deadline: Deadline,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            db,
            job_id: job_id.to_string(),
            deadline,
            current: Arc::new(Mutex::new(JobStatus::Pending)),
            progress,
        }
    }

    pub fn current(&self) -> JobStatus {
        match self.current.lock() {
            Ok(status) => *status,
            Err(poisoned) => {
                log::warn!("Status lock poisoned for job {}, recovering", self.job_id);
                *poisoned.into_inner()
            }
        }
    }

    fn set_current(&self, status: JobStatus) {
        match self.current.lock() {
            Ok(mut current) => *current = status,
            Err(poisoned) => {
                log::warn!("Status lock poisoned for job {}, recovering", self.job_id);
                *poisoned.into_inner() = status;
            }
        }
    }

    /// Appends a line to the processing log.
    pub fn log(&self, message: &str) -> Result<(), PipelineError> {
        let line = log_line(message);
        self.db
            .with_conn(|conn| job_repo::append_log(conn, &self.job_id, &line, &db::now()))?;
        Ok(())
    }

    /// Moves the job to `next`. The budget is checked first: an expired
    /// deadline fails the transition with `Timeout`.
    pub fn advance(&self, next: JobStatus, message: &str) -> Result<(), PipelineError> {
        self.deadline.check(next.as_str())?;

        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(PipelineError::Conflict(self.job_id.clone()));
        }

        let now = db::now();
        let line = log_line(message);
        let changed = self.db.with_tx(|tx| {
            if !job_repo::transition(tx, &self.job_id, from.as_str(), next.as_str(), &now)? {
                return Ok(false);
            }
            job_repo::insert_event(tx, &self.job_id, next.as_str(), message, &now)?;
            job_repo::append_log(tx, &self.job_id, &line, &now)?;
            Ok(true)
        })?;
        if !changed {
            return Err(PipelineError::Conflict(self.job_id.clone()));
        }

        self.set_current(next);
        tracing::info!(job_id = %self.job_id, from = %from, to = %next, "Job status changed");
        self.progress.report(ProgressEvent::Status {
            status: next,
            message: message.to_string(),
        });
        Ok(())
    }

    /// `generating → completed`.
    pub fn complete(&self) -> Result<(), PipelineError> {
        let elapsed_ms = self.deadline.elapsed_ms();
        let now = db::now();
        let message = format!("Report ready in {:.1}s", elapsed_ms as f64 / 1000.0);
        let line = log_line(&message);
        let changed = self.db.with_tx(|tx| {
            if !job_repo::mark_completed(tx, &self.job_id, elapsed_ms, &now)? {
                return Ok(false);
            }
            job_repo::insert_event(tx, &self.job_id, JobStatus::Completed.as_str(), &message, &now)?;
            job_repo::append_log(tx, &self.job_id, &line, &now)?;
            Ok(true)
        })?;
        if !changed {
            return Err(PipelineError::Conflict(self.job_id.clone()));
        }

        self.set_current(JobStatus::Completed);
        self.progress.report(ProgressEvent::Completed { elapsed_ms });
        Ok(())
    }

    /// Writes `error` with the failure kind and message, from whichever
    /// state was active.
    pub fn fail(&self, error: &PipelineError) -> Result<(), PipelineError> {
        let kind = error.kind();
        let message = error.to_string();
        let elapsed_ms = self.deadline.elapsed_ms();
        let from = self.current();
        let now = db::now();
        let line = log_line(&format!("[Error] {}", message));

        let changed = self.db.with_tx(|tx| {
            if !job_repo::mark_failed(
                tx,
                &self.job_id,
                from.as_str(),
                kind.as_str(),
                &message,
                Some(elapsed_ms),
                &now,
            )? {
                return Ok(false);
            }
            job_repo::insert_event(tx, &self.job_id, JobStatus::Error.as_str(), &message, &now)?;
            job_repo::append_log(tx, &self.job_id, &line, &now)?;
            Ok(true)
        })?;
        if !changed {
            return Err(PipelineError::Conflict(self.job_id.clone()));
        }

        self.set_current(JobStatus::Error);
        self.progress.report(ProgressEvent::Failed {
            kind,
            error: message,
            elapsed_ms: Some(elapsed_ms),
        });
        Ok(())
    }
}

/// State carried between stages of one attempt.
pub struct PipelineContext {
    pub job_id: String,
    pub mode: AnalysisMode,
    pub config: JobConfig,
    pub documents: Vec<DocumentRow>,
    pub deadline: Deadline,

    // Extraction result; empty for topic-only runs.
    pub source_text: String,

    pub plan: Option<ResearchPlan>,

    // De-duplicated and clamped to `source_count`.
    pub references: Vec<Reference>,

    pub figures: Vec<Figure>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(
        job_id: &str,
        mode: AnalysisMode,
        config: JobConfig,
        documents: Vec<DocumentRow>,
        deadline: Deadline,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            mode,
            config,
            documents,
            deadline,
            source_text: String::new(),
            plan: None,
            references: Vec::new(),
            figures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, stage: &str, message: impl Into<String>) {
        let warning = PipelineWarning::new(stage, message);
        tracing::warn!(job_id = %self.job_id, stage, warning = %warning.message, "Non-fatal failure");
        self.warnings.push(warning);
    }
}
