//! Read models returned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::{JobFilter, JobRow};
use crate::db::report_repo::{ArtifactRow, ReportRow};
use crate::engine::Reference;
use crate::pipeline::{ErrorKind, PipelineWarning};
use crate::report::{ExportFailure, ExportFormat};
use crate::worker::{AnalysisMode, JobConfig, JobStatus};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, reporting as error",
            s,
            job_id
        );
        JobStatus::Error
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            None
        }
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(raw: &str, what: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("Stored {} unreadable: {}", what, e);
        T::default()
    })
}

/// Seconds spent on the current (or last) attempt. Finished attempts use
/// the recorded duration; running ones are measured from `started_at`.
fn elapsed_seconds(row: &JobRow, status: JobStatus) -> f64 {
    if let Some(ms) = row.elapsed_ms {
        return ms as f64 / 1000.0;
    }
    if status == JobStatus::Pending {
        return 0.0;
    }
    row.started_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(|started| (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0)
        .unwrap_or(0.0)
}

// ─── Status ─────────────────────────────────────────────────────────────────

/// Snapshot returned by `Orchestrator::status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub job_id: String,
    pub mode: String,
    pub status: JobStatus,
    pub label: String,
    pub elapsed_seconds: f64,
    pub completed: bool,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub report_available: bool,
    pub attempts: u32,
    pub processing_log: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PipelineWarning>,
}

impl StatusView {
    pub fn from_row(row: &JobRow, report_available: bool) -> Self {
        let status = parse_status(&row.status, &row.id);
        Self {
            job_id: row.id.clone(),
            mode: row.mode.clone(),
            status,
            label: status.label().to_string(),
            elapsed_seconds: elapsed_seconds(row, status),
            completed: status == JobStatus::Completed,
            error: status == JobStatus::Error,
            error_kind: row.error_kind.as_deref().and_then(ErrorKind::parse),
            error_message: row.error_message.clone(),
            report_available,
            attempts: row.attempts,
            processing_log: row.processing_log.clone(),
            warnings: parse_json_or_default(&row.warnings, "warnings"),
        }
    }

    /// No worker will touch the job again unless the caller retries it.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub job_id: String,
    pub html: String,
    pub markdown: String,
    pub references: Vec<Reference>,
    pub search_payloads: Vec<serde_json::Value>,
    pub reasoning: String,
    pub formats: Vec<ExportFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_failures: Vec<ExportFailure>,
    pub created_at: String,
}

impl ReportView {
    pub fn from_rows(report: &ReportRow, artifacts: &[ArtifactRow]) -> Self {
        Self {
            job_id: report.job_id.clone(),
            html: report.content_html.clone(),
            markdown: report.content_markdown.clone(),
            references: parse_json_or_default(&report.references_json, "references"),
            search_payloads: parse_json_or_default(&report.search_results_raw, "search payloads"),
            reasoning: report.reasoning.clone(),
            formats: artifacts
                .iter()
                .filter_map(|a| ExportFormat::parse(&a.format))
                .collect(),
            export_failures: parse_json_or_default(&report.export_failures, "export failures"),
            created_at: report.created_at.clone(),
        }
    }
}

/// Bytes of one exported artifact, ready to hand to a caller.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

// ─── History ────────────────────────────────────────────────────────────────

/// Filters for `Orchestrator::history`. Dates bound `created_at`,
/// inclusive.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub status: Option<JobStatus>,
    pub mode: Option<AnalysisMode>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl HistoryQuery {
    pub(crate) fn to_filter(&self) -> JobFilter {
        JobFilter {
            status: self.status.map(|s| s.as_str().to_string()),
            mode: self.mode.map(|m| m.as_str().to_string()),
            from_date: self.from_date.map(format_timestamp),
            to_date: self.to_date.map(format_timestamp),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// One row of the job history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub mode: String,
    pub status: JobStatus,
    pub objective: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
    pub created_at: String,
}

impl JobSummary {
    pub fn from_row(row: &JobRow) -> Self {
        let objective = serde_json::from_str::<JobConfig>(&row.config)
            .map(|c| c.objective)
            .unwrap_or_default();
        Self {
            job_id: row.id.clone(),
            mode: row.mode.clone(),
            status: parse_status(&row.status, &row.id),
            objective,
            attempts: row.attempts,
            error_kind: row.error_kind.as_deref().and_then(ErrorKind::parse),
            elapsed_ms: row.elapsed_ms,
            created_at: row.created_at.clone(),
        }
    }
}

/// Response for job listing with pagination.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub jobs: Vec<JobSummary>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}
