//! Document analysis pipeline: uploaded documents (or a bare topic) go
//! through cascading text extraction, an AI analysis with optional web
//! research, optional illustrations, and come out as an HTML report with
//! PDF, DOCX, XLSX and TXT exports.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod images;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, Budgets, Config};
pub use db::Database;
pub use engine::{AnalysisEngine, Reference, SearchProvider};
pub use error::{
    ConfigError, DossierError, EngineError, ExtractionError, JobError, Result, StorageError,
    WorkerError,
};
pub use orchestrator::{
    CreateJob, Download, HistoryPage, HistoryQuery, JobReader, JobSummary, Orchestrator,
    ReportView, StatusView, UploadedDocument,
};
pub use pipeline::{Deadline, ErrorKind, Pipeline};
pub use report::ExportFormat;
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use telemetry::{init_tracing, init_tracing_with_filter, LogFormat};
pub use worker::{AnalysisMode, Domain, JobConfig, JobStatus, Locale, ReportStyle};
