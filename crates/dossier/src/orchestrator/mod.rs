//! Public entry point: creates jobs, hands them to the worker pool and
//! answers status, report, download, retry and history queries from the
//! durable record.

mod reader;
mod views;

pub use reader::JobReader;
pub use views::{Download, HistoryPage, HistoryQuery, JobSummary, ReportView, StatusView};

use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::Config;
use crate::db::document_repo::{self, DocumentRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{self, report_repo, Database};
use crate::error::{JobError, Result};
use crate::extraction::declared_type;
use crate::pipeline::{log_line, ErrorKind, Pipeline};
use crate::report::ExportFormat;
use crate::storage::FileStorage;
use crate::worker::{ActiveJobs, AnalysisMode, JobConfig, JobStatus, WorkerPool};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateJob {
    pub mode: AnalysisMode,
    pub documents: Vec<UploadedDocument>,
    pub config: JobConfig,
}

pub struct Orchestrator {
    db: Database,
    storage: FileStorage,
    reader: JobReader,
    pool: WorkerPool,
    broadcaster: JobProgressBroadcaster,
    active: ActiveJobs,
}

impl Orchestrator {
    /// Opens the database under the configured data directory and starts
    /// the production pipeline.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_file())?;
        let pipeline = Pipeline::from_config(config, db)?;
        Self::start(pipeline, config.worker_count)
    }

    /// Starts `worker_count` workers around an already built pipeline, then
    /// recovers jobs a previous process left behind.
    pub fn start(pipeline: Pipeline, worker_count: usize) -> Result<Self> {
        let broadcaster = JobProgressBroadcaster::default();
        let active = ActiveJobs::default();
        let db = pipeline.database().clone();
        let storage = pipeline.storage().clone();
        let pool = WorkerPool::new(pipeline, broadcaster.clone(), worker_count, active.clone())?;

        let orchestrator = Self {
            reader: JobReader::new(db.clone(), storage.clone()),
            db,
            storage,
            pool,
            broadcaster,
            active,
        };
        orchestrator.recover()?;
        Ok(orchestrator)
    }

    /// Validates the request, stores the uploads, persists the job in
    /// `pending` and enqueues it. Nothing is written when validation fails.
    pub fn create_job(&self, request: CreateJob) -> Result<String> {
        let CreateJob {
            mode,
            documents,
            config,
        } = request;

        mode.validate_document_count(documents.len())?;
        config.validate(mode)?;
        for document in &documents {
            if document.content.is_empty() {
                return Err(JobError::Validation(format!(
                    "document '{}' is empty",
                    document.filename
                ))
                .into());
            }
        }
        let config_json =
            serde_json::to_string(&config).map_err(|e| JobError::Validation(e.to_string()))?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let now = db::now();

        let rows = match self.store_uploads(&job_id, &documents, &now) {
            Ok(rows) => rows,
            Err(e) => {
                self.discard_uploads(&job_id);
                return Err(e);
            }
        };

        let message = format!(
            "Job created: mode {}, {} document(s)",
            mode.as_str(),
            rows.len()
        );
        let job = JobRow {
            id: job_id.clone(),
            mode: mode.as_str().to_string(),
            config: config_json,
            status: JobStatus::Pending.as_str().to_string(),
            error_kind: None,
            error_message: None,
            processing_log: log_line(&message),
            attempts: 0,
            elapsed_ms: None,
            warnings: "[]".to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
            started_at: None,
            completed_at: None,
        };

        let persisted = self.db.with_tx(|tx| {
            job_repo::insert(tx, &job)?;
            for row in &rows {
                document_repo::insert(tx, row)?;
            }
            job_repo::insert_event(tx, &job_id, JobStatus::Pending.as_str(), &message, &now)?;
            Ok(())
        });
        if let Err(e) = persisted {
            self.discard_uploads(&job_id);
            return Err(e.into());
        }

        log::info!("Created job {} ({}, {} document(s))", job_id, mode, rows.len());
        self.enqueue(&job_id)?;
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<StatusView> {
        self.reader.status(job_id)
    }

    /// The generated report, or `None` while the job has not completed.
    pub fn report(&self, job_id: &str) -> Result<Option<ReportView>> {
        self.reader.report(job_id)
    }

    pub fn download(&self, job_id: &str, format: ExportFormat) -> Result<Download> {
        self.reader.download(job_id, format)
    }

    /// `error → pending`, optionally with a revised configuration, then
    /// enqueues a fresh attempt. Rejected with `AlreadyActive` while the
    /// job still has a queued or running attempt.
    pub fn retry(&self, job_id: &str, revised: Option<JobConfig>) -> Result<()> {
        if !self.active.claim(job_id) {
            return Err(JobError::AlreadyActive(job_id.to_string()).into());
        }
        if let Err(e) = self.reset_for_retry(job_id, revised.as_ref()) {
            self.active.release(job_id);
            return Err(e);
        }
        log::info!("Job {} reset for retry", job_id);
        self.submit_claimed(job_id)
    }

    /// `error → cancelled`: the caller gives up on the job.
    pub fn abandon(&self, job_id: &str) -> Result<()> {
        if self.active.contains(job_id) {
            return Err(JobError::AlreadyActive(job_id.to_string()).into());
        }

        let now = db::now();
        let message = "Job abandoned";
        let line = log_line(message);
        let changed = self.db.with_tx(|tx| {
            if !job_repo::transition(
                tx,
                job_id,
                JobStatus::Error.as_str(),
                JobStatus::Cancelled.as_str(),
                &now,
            )? {
                return Ok(false);
            }
            job_repo::insert_event(tx, job_id, JobStatus::Cancelled.as_str(), message, &now)?;
            job_repo::append_log(tx, job_id, &line, &now)?;
            Ok(true)
        })?;
        if !changed {
            let from = self.current_status(job_id)?;
            return Err(JobError::InvalidTransition {
                id: job_id.to_string(),
                from,
                to: JobStatus::Cancelled,
            }
            .into());
        }

        self.broadcaster
            .send(JobProgressEvent::new(job_id, JobStatus::Cancelled, message));
        Ok(())
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        self.reader.history(query)
    }

    pub fn reader(&self) -> &JobReader {
        &self.reader
    }

    /// Live progress of every job. Slow receivers lag and lose events; the
    /// durable record stays authoritative.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Blocks until the job has settled (`completed`, `error` or
    /// `cancelled` with no attempt in flight) or `timeout` passes, and
    /// returns the last status seen.
    pub fn wait_for(&self, job_id: &str, timeout: Duration) -> Result<StatusView> {
        let started = Instant::now();
        loop {
            let view = self.status(job_id)?;
            if (view.is_settled() && !self.active.contains(job_id))
                || started.elapsed() >= timeout
                || self.pool.is_shutdown()
            {
                return Ok(view);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.active.contains(job_id)
    }

    /// Stops accepting work. Safe to call from a signal handler thread.
    pub fn request_shutdown(&self) {
        self.pool.shutdown();
    }

    /// Stops the pool and waits for in-flight attempts to finish.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }

    fn store_uploads(
        &self,
        job_id: &str,
        documents: &[UploadedDocument],
        now: &str,
    ) -> Result<Vec<DocumentRow>> {
        let mut rows = Vec::with_capacity(documents.len());
        for (position, document) in documents.iter().enumerate() {
            let path = self
                .storage
                .store_upload(job_id, &document.filename, &document.content)?;
            rows.push(DocumentRow {
                id: uuid::Uuid::new_v4().to_string(),
                job_id: job_id.to_string(),
                position: position as u32,
                original_filename: document.filename.clone(),
                declared_type: declared_type(&document.filename),
                storage_path: path.to_string_lossy().to_string(),
                size_bytes: i64::try_from(document.content.len()).unwrap_or(i64::MAX),
                extracted_text: None,
                extraction_method: None,
                extraction_metadata: None,
                created_at: now.to_string(),
            });
        }
        Ok(rows)
    }

    fn discard_uploads(&self, job_id: &str) {
        if let Err(e) = self.storage.remove_uploads(job_id) {
            log::warn!("Could not remove uploads of job {}: {}", job_id, e);
        }
    }

    fn reset_for_retry(&self, job_id: &str, revised: Option<&JobConfig>) -> Result<()> {
        let row = self
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let status = parse_status(&row)?;
        if status != JobStatus::Error {
            return Err(JobError::InvalidTransition {
                id: job_id.to_string(),
                from: status,
                to: JobStatus::Pending,
            }
            .into());
        }

        let config_json = match revised {
            Some(config) => {
                let mode = AnalysisMode::parse(&row.mode).ok_or_else(|| JobError::Corrupt {
                    id: job_id.to_string(),
                    reason: format!("unknown mode '{}'", row.mode),
                })?;
                config.validate(mode)?;
                Some(
                    serde_json::to_string(config)
                        .map_err(|e| JobError::Validation(e.to_string()))?,
                )
            }
            None => None,
        };

        let now = db::now();
        let message = if config_json.is_some() {
            "Retry requested with revised configuration"
        } else {
            "Retry requested"
        };
        let line = log_line(message);
        let changed = self.db.with_tx(|tx| {
            if !job_repo::reset_for_retry(tx, job_id, config_json.as_deref(), &now)? {
                return Ok(false);
            }
            report_repo::delete_for_job(tx, job_id)?;
            job_repo::insert_event(tx, job_id, JobStatus::Pending.as_str(), message, &now)?;
            job_repo::append_log(tx, job_id, &line, &now)?;
            Ok(true)
        })?;
        if !changed {
            return Err(JobError::InvalidTransition {
                id: job_id.to_string(),
                from: self.current_status(job_id)?,
                to: JobStatus::Pending,
            }
            .into());
        }

        if let Err(e) = self.storage.remove_artifacts(job_id) {
            log::warn!("Could not remove artifacts of job {}: {}", job_id, e);
        }
        Ok(())
    }

    fn current_status(&self, job_id: &str) -> Result<JobStatus> {
        let row = self
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        parse_status(&row)
    }

    fn enqueue(&self, job_id: &str) -> Result<()> {
        if !self.active.claim(job_id) {
            return Err(JobError::AlreadyActive(job_id.to_string()).into());
        }
        self.submit_claimed(job_id)
    }

    /// A job whose submit fails stays `pending` in the store and is picked
    /// up again by the next `start`.
    fn submit_claimed(&self, job_id: &str) -> Result<()> {
        // Sent first so subscribers see `pending` before any worker event.
        self.broadcaster
            .send(JobProgressEvent::new(job_id, JobStatus::Pending, "Queued"));
        if let Err(e) = self.pool.submit(job_id) {
            self.active.release(job_id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Attempts interrupted by a previous shutdown have no owner left: they
    /// are failed so the caller can retry them. `pending` jobs are queued
    /// again.
    fn recover(&self) -> Result<()> {
        let message = "Interrupted before completion";
        for status in JobStatus::ALL.into_iter().filter(|s| s.is_running()) {
            let ids = self
                .db
                .with_conn(|conn| job_repo::ids_with_status(conn, status.as_str()))?;
            for job_id in ids {
                let now = db::now();
                let line = log_line(&format!("[Error] {}", message));
                self.db.with_tx(|tx| {
                    if job_repo::mark_failed(
                        tx,
                        &job_id,
                        status.as_str(),
                        ErrorKind::Internal.as_str(),
                        message,
                        None,
                        &now,
                    )? {
                        job_repo::insert_event(
                            tx,
                            &job_id,
                            JobStatus::Error.as_str(),
                            message,
                            &now,
                        )?;
                        job_repo::append_log(tx, &job_id, &line, &now)?;
                    }
                    Ok(())
                })?;
                log::warn!("Job {} was interrupted while {}, marked as error", job_id, status);
            }
        }

        let pending = self
            .db
            .with_conn(|conn| job_repo::ids_with_status(conn, JobStatus::Pending.as_str()))?;
        if !pending.is_empty() {
            log::info!("Re-queueing {} pending job(s)", pending.len());
        }
        for job_id in pending {
            self.enqueue(&job_id)?;
        }
        Ok(())
    }
}

fn parse_status(row: &JobRow) -> Result<JobStatus> {
    JobStatus::parse(&row.status).ok_or_else(|| {
        JobError::Corrupt {
            id: row.id.clone(),
            reason: format!("unknown status '{}'", row.status),
        }
        .into()
    })
}
