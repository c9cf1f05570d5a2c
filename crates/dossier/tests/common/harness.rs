//! Test harness for end-to-end job runs.
//!
//! Each harness owns a temporary data directory holding the job database
//! and stored files, and starts orchestrators over it with stub services.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use assert_fs::TempDir;
use dossier::db::document_repo::{self, DocumentRow};
use dossier::db::job_repo;
use dossier::extraction::{ExtractionCascade, Tier};
use dossier::report::ReportAssembler;
use dossier::storage::FileStorage;
use dossier::{
    AnalysisEngine, AnalysisMode, Budgets, CreateJob, Database, JobConfig, JobStatus,
    Orchestrator, Pipeline, SearchProvider, StatusView, UploadedDocument,
};

/// Upper bound for waiting on a job in tests.
pub const WAIT: Duration = Duration::from_secs(30);

pub struct TestHarness {
    pub temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Opens the harness database. Every call shares the same file.
    pub fn database(&self) -> Database {
        Database::open(&self.temp_dir.path().join("dossier.db")).expect("Failed to open database")
    }

    /// Pipeline with the standard cascade and exporters, no search and the
    /// default budgets.
    pub fn pipeline(&self, engine: Arc<dyn AnalysisEngine>) -> PipelineBuilder {
        PipelineBuilder {
            db: self.database(),
            storage: FileStorage::new(self.temp_dir.path()),
            engine,
            budgets: Budgets::default(),
            cascade: None,
            search: None,
            assembler: None,
        }
    }

    /// Every status the job has entered, in order.
    pub fn status_trail(&self, job_id: &str) -> Vec<JobStatus> {
        self.database()
            .with_conn(|conn| job_repo::list_events(conn, job_id))
            .expect("Failed to read events")
            .iter()
            .filter_map(|e| JobStatus::parse(&e.status))
            .collect()
    }

    pub fn documents(&self, job_id: &str) -> Vec<DocumentRow> {
        self.database()
            .with_conn(|conn| document_repo::list_for_job(conn, job_id))
            .expect("Failed to read documents")
    }
}

/// Collects pipeline options before an orchestrator is started on it.
pub struct PipelineBuilder {
    db: Database,
    storage: FileStorage,
    engine: Arc<dyn AnalysisEngine>,
    budgets: Budgets,
    cascade: Option<Vec<Tier>>,
    search: Option<Arc<dyn SearchProvider>>,
    assembler: Option<ReportAssembler>,
}

impl PipelineBuilder {
    pub fn cascade(mut self, tiers: Vec<Tier>) -> Self {
        self.cascade = Some(tiers);
        self
    }

    pub fn search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn assembler(mut self, assembler: ReportAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Total attempt budget; the stage caps keep their defaults.
    pub fn total_budget(mut self, total: Duration) -> Self {
        self.budgets.total = total;
        self
    }

    pub fn build(self) -> Pipeline {
        let mut pipeline = Pipeline::new(self.db, self.storage, self.engine, self.budgets)
            .with_search(self.search);
        if let Some(tiers) = self.cascade {
            pipeline = pipeline.with_cascade(ExtractionCascade::new(tiers));
        }
        if let Some(assembler) = self.assembler {
            pipeline = pipeline.with_assembler(assembler);
        }
        pipeline
    }

    pub fn start(self) -> Orchestrator {
        Orchestrator::start(self.build(), 2).expect("Failed to start orchestrator")
    }
}

/// Topic research request without web search.
pub fn topic(objective: &str) -> CreateJob {
    CreateJob {
        mode: AnalysisMode::FreeForm,
        documents: Vec::new(),
        config: JobConfig {
            objective: objective.to_string(),
            include_search: false,
            ..JobConfig::default()
        },
    }
}

/// Single-document request.
pub fn document(filename: &str, content: impl Into<Vec<u8>>) -> CreateJob {
    CreateJob {
        mode: AnalysisMode::Document,
        documents: vec![UploadedDocument::new(filename, content)],
        config: JobConfig {
            include_search: false,
            ..JobConfig::default()
        },
    }
}

/// Creates the job and waits for it to settle.
pub fn run_to_end(orchestrator: &Orchestrator, request: CreateJob) -> StatusView {
    let job_id = orchestrator.create_job(request).expect("Failed to create job");
    orchestrator.wait_for(&job_id, WAIT).expect("Failed to wait for job")
}
