use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DossierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Secret for '{field}' could not be resolved: {source}")]
    Secret {
        field: &'static str,
        #[source]
        source: crate::secrets::SecretError,
    },
}

/// Failures of a single extraction tier. Only `ReadDocument` is terminal
/// for the cascade; every other variant makes it fall through.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process office document: {0}")]
    OfficeProcessing(String),

    #[error("Extracted text quality too low: {0}")]
    LowQuality(String),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Extractor thread terminated unexpectedly")]
    WorkerLost,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine is not configured: {0}")]
    NotConfigured(String),

    #[error("Engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Engine response could not be interpreted: {0}")]
    InvalidResponse(String),

    #[error("Engine produced an empty report")]
    EmptyReport,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search is not configured: {0}")]
    NotConfigured(String),

    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Search failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image provider '{0}' is not configured")]
    NotConfigured(&'static str),

    #[error("Image request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image provider returned status {status}")]
    Status { status: u16 },

    #[error("Image payload invalid: {0}")]
    InvalidPayload(String),

    #[error("No image found for '{0}'")]
    NoResult(String),

    #[error("Image exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Image rendering failed: {0}")]
    Render(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PDF export failed: {0}")]
    Pdf(String),

    #[error("Office document export failed: {0}")]
    Office(String),

    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Exporter for '{0}' is disabled")]
    Disabled(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Invalid transition for job '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: crate::worker::JobStatus,
        to: crate::worker::JobStatus,
    },

    #[error("Job '{0}' already has an active run")]
    AlreadyActive(String),

    #[error("Invalid job request: {0}")]
    Validation(String),

    #[error("'{format}' export is not available for job '{id}'")]
    NotAvailable { id: String, format: String },

    #[error("Stored job '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DossierError>;
