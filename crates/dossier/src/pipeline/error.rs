use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{EngineError, ExtractionError, StorageError};

/// Failure category persisted with a job in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExtractionFailure,
    EngineFailure,
    TimeoutExceeded,
    AssemblyFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExtractionFailure => "extraction_failure",
            ErrorKind::EngineFailure => "engine_failure",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::AssemblyFailure => "assembly_failure",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extraction_failure" => Some(Self::ExtractionFailure),
            "engine_failure" => Some(Self::EngineFailure),
            "timeout_exceeded" => Some(Self::TimeoutExceeded),
            "assembly_failure" => Some(Self::AssemblyFailure),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-level failure that aborts a job attempt.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Analysis engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error(
        "Time budget of {}s exceeded while {stage} ({:.1}s elapsed)",
        .budget.as_secs(),
        .elapsed.as_secs_f64()
    )]
    Timeout {
        stage: String,
        elapsed: Duration,
        budget: Duration,
    },

    #[error("Report assembly failed: {0}")]
    Assembly(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Database failure: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job '{0}' was modified by another run")]
    Conflict(String),

    #[error("Stored job is unreadable: {0}")]
    Corrupt(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Extraction(_) => ErrorKind::ExtractionFailure,
            PipelineError::Engine(_) => ErrorKind::EngineFailure,
            PipelineError::Timeout { .. } => ErrorKind::TimeoutExceeded,
            PipelineError::Assembly(_) => ErrorKind::AssemblyFailure,
            PipelineError::Storage(_)
            | PipelineError::Database(_)
            | PipelineError::Conflict(_)
            | PipelineError::Corrupt(_) => ErrorKind::Internal,
        }
    }
}

/// Non-fatal problem recorded with the job (search, image or export
/// failures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineWarning {
    pub stage: String,
    pub message: String,
}

impl PipelineWarning {
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}
