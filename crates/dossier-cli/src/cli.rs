use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dossier::{AnalysisMode, Domain, JobStatus, Locale, LogFormat, ReportStyle};

/// Top-level parser for the `dossier` binary.
#[derive(Debug, Parser)]
#[command(
    name = "dossier",
    version,
    about = "Turn documents or a topic into an analysis report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (JSON or YAML). Built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Info-level logging (default is warnings only)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a job from documents or a topic and wait for its report
    Analyze(AnalyzeArgs),
    /// Show the status and processing log of a job
    Status {
        job_id: String,
    },
    /// Retry a failed job, optionally with a revised configuration
    Retry(RetryArgs),
    /// List past jobs
    History(HistoryArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Document,
    MultiDocument,
    Enhancement,
    FreeForm,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Document => AnalysisMode::Document,
            ModeArg::MultiDocument => AnalysisMode::MultiDocument,
            ModeArg::Enhancement => AnalysisMode::Enhancement,
            ModeArg::FreeForm => AnalysisMode::FreeForm,
        }
    }
}

/// Parses a value by its serialized name, so the CLI accepts exactly what
/// a stored job configuration accepts.
fn parse_serde<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown value '{}'", value))
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Documents to analyze; none for topic research
    pub files: Vec<PathBuf>,

    /// Inferred from the number of files when omitted
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    #[arg(short, long, default_value = "")]
    pub objective: String,

    #[arg(long, default_value = "other", value_parser = parse_serde::<Domain>)]
    pub domain: Domain,

    #[arg(long, default_value = "")]
    pub domain_detail: String,

    #[arg(long, default_value = "")]
    pub geography: String,

    #[arg(long, default_value = "pt-BR", value_parser = parse_serde::<Locale>)]
    pub locale: Locale,

    #[arg(long, default_value = "analytical", value_parser = parse_serde::<ReportStyle>)]
    pub style: ReportStyle,

    /// Target number of references (1-20)
    #[arg(long, default_value_t = 5)]
    pub sources: u32,

    /// Illustrate the report
    #[arg(long)]
    pub images: bool,

    /// Do not let the engine search the web
    #[arg(long)]
    pub no_search: bool,

    #[arg(long, default_value = "")]
    pub search_scope: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct RetryArgs {
    pub job_id: String,

    /// JSON file with a revised job configuration
    #[arg(long)]
    pub job_config: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Directory the exported reports are written to
    #[arg(short = 'O', long, default_value = ".")]
    pub out: PathBuf,

    /// Seconds to wait for the job to finish
    #[arg(long, default_value_t = 300)]
    pub wait: u64,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, value_parser = parse_serde::<JobStatus>)]
    pub status: Option<JobStatus>,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    #[arg(short, long, default_value_t = 20)]
    pub limit: u64,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}
