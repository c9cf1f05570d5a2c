//! Analysis request types: mode, domain, locale, style and the per-job
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::pipeline::{ErrorKind, PipelineError};
use crate::worker::JobStatus;

pub const MIN_SOURCE_COUNT: u32 = 1;
pub const MAX_SOURCE_COUNT: u32 = 20;
pub const MAX_DOCUMENTS: usize = 20;

const MAX_OBJECTIVE_CHARS: usize = 5000;
const MAX_SHORT_FIELD_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Document,
    MultiDocument,
    Enhancement,
    FreeForm,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Document => "document",
            AnalysisMode::MultiDocument => "multi_document",
            AnalysisMode::Enhancement => "enhancement",
            AnalysisMode::FreeForm => "free_form",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(Self::Document),
            "multi_document" => Some(Self::MultiDocument),
            "enhancement" => Some(Self::Enhancement),
            "free_form" => Some(Self::FreeForm),
            _ => None,
        }
    }

    /// Topic-only runs have no documents and skip extraction.
    pub fn needs_documents(&self) -> bool {
        !matches!(self, AnalysisMode::FreeForm)
    }

    /// Checks the number of uploaded documents against the mode.
    pub fn validate_document_count(&self, count: usize) -> Result<(), JobError> {
        let ok = match self {
            AnalysisMode::FreeForm => count == 0,
            AnalysisMode::Document | AnalysisMode::Enhancement => count == 1,
            AnalysisMode::MultiDocument => (1..=MAX_DOCUMENTS).contains(&count),
        };
        if ok {
            Ok(())
        } else {
            let expected = match self {
                AnalysisMode::FreeForm => "no documents".to_string(),
                AnalysisMode::Document | AnalysisMode::Enhancement => {
                    "exactly one document".to_string()
                }
                AnalysisMode::MultiDocument => format!("1 to {} documents", MAX_DOCUMENTS),
            };
            Err(JobError::Validation(format!(
                "mode '{}' expects {}, got {}",
                self.as_str(),
                expected,
                count
            )))
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Professional area of the analysis. Portuguese keys are accepted as
/// aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    #[serde(alias = "financeiro")]
    Finance,
    #[serde(alias = "juridico")]
    Legal,
    #[serde(alias = "saude")]
    Health,
    #[serde(alias = "estetica")]
    Aesthetics,
    #[serde(alias = "educacao")]
    Education,
    #[serde(alias = "tecnologia")]
    Technology,
    #[serde(alias = "treinamento")]
    Training,
    #[serde(alias = "protocolo")]
    Protocol,
    Marketing,
    #[serde(alias = "engenharia")]
    Engineering,
    #[default]
    #[serde(alias = "outro")]
    Other,
}

impl Domain {
    pub const ALL: [Domain; 11] = [
        Domain::Finance,
        Domain::Legal,
        Domain::Health,
        Domain::Aesthetics,
        Domain::Education,
        Domain::Technology,
        Domain::Training,
        Domain::Protocol,
        Domain::Marketing,
        Domain::Engineering,
        Domain::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Finance => "finance",
            Domain::Legal => "legal",
            Domain::Health => "health",
            Domain::Aesthetics => "aesthetics",
            Domain::Education => "education",
            Domain::Technology => "technology",
            Domain::Training => "training",
            Domain::Protocol => "protocol",
            Domain::Marketing => "marketing",
            Domain::Engineering => "engineering",
            Domain::Other => "other",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    #[serde(rename = "pt-BR", alias = "pt", alias = "pt_BR")]
    PtBr,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "es")]
    Es,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::PtBr => "pt-BR",
            Locale::En => "en",
            Locale::Es => "es",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    #[default]
    #[serde(alias = "analitico")]
    Analytical,
    #[serde(alias = "comparativo")]
    Comparative,
    #[serde(alias = "resumo_executivo")]
    ExecutiveSummary,
    #[serde(alias = "tecnico")]
    Technical,
    #[serde(alias = "parecer")]
    Opinion,
}

impl ReportStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStyle::Analytical => "analytical",
            ReportStyle::Comparative => "comparative",
            ReportStyle::ExecutiveSummary => "executive_summary",
            ReportStyle::Technical => "technical",
            ReportStyle::Opinion => "opinion",
        }
    }
}

impl std::fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied configuration of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub domain_detail: String,
    #[serde(default)]
    pub geography: String,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub report_style: ReportStyle,
    /// Target number of references, advisory for the engine.
    #[serde(default = "default_source_count")]
    pub source_count: u32,
    #[serde(default)]
    pub include_images: bool,
    /// Grants the engine the search capability.
    #[serde(default = "default_true")]
    pub include_search: bool,
    #[serde(default)]
    pub search_scope: String,
}

fn default_source_count() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            objective: String::new(),
            domain: Domain::default(),
            domain_detail: String::new(),
            geography: String::new(),
            locale: Locale::default(),
            report_style: ReportStyle::default(),
            source_count: default_source_count(),
            include_images: false,
            include_search: true,
            search_scope: String::new(),
        }
    }
}

impl JobConfig {
    pub fn validate(&self, mode: AnalysisMode) -> Result<(), JobError> {
        if !(MIN_SOURCE_COUNT..=MAX_SOURCE_COUNT).contains(&self.source_count) {
            return Err(JobError::Validation(format!(
                "source_count must be between {} and {}, got {}",
                MIN_SOURCE_COUNT, MAX_SOURCE_COUNT, self.source_count
            )));
        }

        if mode == AnalysisMode::FreeForm && self.objective.trim().is_empty() {
            return Err(JobError::Validation(
                "objective is required for free_form analyses".to_string(),
            ));
        }

        if self.objective.chars().count() > MAX_OBJECTIVE_CHARS {
            return Err(JobError::Validation(format!(
                "objective exceeds {} characters",
                MAX_OBJECTIVE_CHARS
            )));
        }

        for (name, value) in [
            ("domain_detail", &self.domain_detail),
            ("geography", &self.geography),
        ] {
            if value.chars().count() > MAX_SHORT_FIELD_CHARS {
                return Err(JobError::Validation(format!(
                    "{} exceeds {} characters",
                    name, MAX_SHORT_FIELD_CHARS
                )));
            }
        }

        Ok(())
    }

    /// Search is granted on request, and always for topic research.
    pub fn grants_search(&self, mode: AnalysisMode) -> bool {
        self.include_search || mode == AnalysisMode::FreeForm
    }
}

/// Outcome of one job attempt, reported by the worker that ran it.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub elapsed_ms: i64,
}

impl JobResult {
    pub fn completed(job_id: &str, elapsed_ms: i64) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Completed,
            error_kind: None,
            error: None,
            elapsed_ms,
        }
    }

    pub fn failure(job_id: &str, status: JobStatus, error: &PipelineError, elapsed_ms: i64) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            elapsed_ms,
        }
    }

    pub fn success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
