//! Report assembly.
//!
//! The engine's markdown becomes a sanitized HTML preview plus one artifact
//! per [`ExportFormat`]. Exporters are independent: a failing exporter is
//! recorded and the others still run.

pub mod blocks;
pub mod charts;
pub mod docx;
pub mod html;
pub mod labels;
pub mod pdf;
pub mod theme;
pub mod txt;
pub mod xlsx;

use std::io::{Cursor, Write};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::engine::Reference;
use crate::error::ExportError;
use crate::images::{Placement, ReportImage};
use crate::worker::{AnalysisMode, JobConfig};

pub use blocks::{parse_blocks, Block, Span};
pub use charts::detect_charts;
pub use docx::DocxExporter;
pub use pdf::PdfExporter;
pub use txt::TxtExporter;
pub use xlsx::XlsxExporter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
    Xlsx,
    Txt,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Pdf,
        ExportFormat::Docx,
        ExportFormat::Xlsx,
        ExportFormat::Txt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JPEG placed in the report, either an illustration or a chart.
#[derive(Debug, Clone)]
pub struct Figure {
    pub caption: String,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

impl From<ReportImage> for Figure {
    fn from(image: ReportImage) -> Self {
        Self {
            caption: image.caption,
            jpeg: image.jpeg,
            width: image.width,
            height: image.height,
            placement: image.placement,
        }
    }
}

/// Everything an exporter needs.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub job_id: String,
    pub title: String,
    pub mode: AnalysisMode,
    pub config: JobConfig,
    pub markdown: String,
    pub references: Vec<Reference>,
    pub figures: Vec<Figure>,
    pub brand: String,
    pub generated_at: NaiveDateTime,
}

impl ReportInput {
    /// First `#` heading of the markdown, else the objective, else a
    /// localized default.
    pub fn resolve_title(markdown: &str, config: &JobConfig) -> String {
        if let Some(title) = blocks::first_title(markdown) {
            return title;
        }
        let objective = config.objective.trim();
        if !objective.is_empty() {
            return crate::sanitize::truncate_chars(objective, 120).to_string();
        }
        labels::labels(config.locale).report.to_string()
    }

    pub fn labels(&self) -> &'static labels::Labels {
        labels::labels(self.config.locale)
    }

    /// Figures rendered after the section titled like `heading`.
    pub fn figures_after(&self, heading: &str) -> impl Iterator<Item = &Figure> {
        let heading = heading.to_string();
        self.figures.iter().filter(move |f| match &f.placement {
            Placement::AfterSection(topic) => figure_matches_heading(topic, &heading),
            Placement::Figures => false,
        })
    }

    /// Figures that go to the figures section: those placed there plus
    /// section figures whose heading never appears.
    pub fn section_figures(&self) -> Vec<&Figure> {
        let headings: Vec<String> = parse_blocks(&self.markdown)
            .into_iter()
            .filter_map(|b| match b {
                Block::Heading { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        self.figures
            .iter()
            .filter(|f| match &f.placement {
                Placement::Figures => true,
                Placement::AfterSection(topic) => {
                    !headings.iter().any(|h| figure_matches_heading(topic, h))
                }
            })
            .collect()
    }
}

pub(crate) fn figure_matches_heading(topic: &str, heading: &str) -> bool {
    let topic = topic.trim().to_lowercase();
    let heading = heading.trim().to_lowercase();
    if topic.is_empty() || heading.is_empty() {
        return false;
    }
    heading.contains(&topic) || topic.contains(&heading)
}

/// Headings that close a report, before which the figures section goes.
pub(crate) fn is_closing_heading(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["conclus", "recomenda", "recommend", "consider"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Text safe for an XML text node or attribute. Control characters that
/// XML 1.0 forbids are dropped.
pub(crate) fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

/// Zips the parts of an OOXML package.
pub(crate) fn write_package(parts: &[(&str, String)]) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in parts {
            writer.start_file(*name, options)?;
            writer.write_all(content.as_bytes())?;
        }
        writer.finish()?;
    }
    Ok(buffer.into_inner())
}

pub trait Exporter: Send + Sync {
    fn format(&self) -> ExportFormat;
    fn export(&self, input: &ReportInput) -> Result<Vec<u8>, ExportError>;
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportFailure {
    pub format: ExportFormat,
    pub error: String,
}

#[derive(Debug)]
pub struct AssembledReport {
    pub html: String,
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ExportFailure>,
}

/// Runs the exporters in order and keeps what succeeds.
pub struct ReportAssembler {
    exporters: Vec<Box<dyn Exporter>>,
}

impl ReportAssembler {
    pub fn new(exporters: Vec<Box<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    /// The built-in exporters for `formats`, unknown names skipped.
    pub fn standard(formats: &[String]) -> Self {
        let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();
        for name in formats {
            match ExportFormat::parse(name) {
                Some(ExportFormat::Pdf) => exporters.push(Box::new(PdfExporter)),
                Some(ExportFormat::Docx) => exporters.push(Box::new(DocxExporter)),
                Some(ExportFormat::Xlsx) => exporters.push(Box::new(XlsxExporter)),
                Some(ExportFormat::Txt) => exporters.push(Box::new(TxtExporter)),
                None => log::warn!("Ignoring unknown report format '{}'", name),
            }
        }
        Self::new(exporters)
    }

    pub fn formats(&self) -> Vec<ExportFormat> {
        self.exporters.iter().map(|e| e.format()).collect()
    }

    /// Fails only when no exporter produced an artifact.
    pub fn assemble(&self, input: &ReportInput) -> Result<AssembledReport, String> {
        let html = html::render_html(input);
        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for exporter in &self.exporters {
            let format = exporter.format();
            let _span = tracing::info_span!("export", format = format.as_str()).entered();
            match exporter.export(input) {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::debug!(bytes = bytes.len(), "Artifact exported");
                    artifacts.push(Artifact { format, bytes });
                }
                Ok(_) => {
                    tracing::warn!("Exporter produced no bytes");
                    failures.push(ExportFailure {
                        format,
                        error: "empty output".to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Exporter failed");
                    failures.push(ExportFailure {
                        format,
                        error: e.to_string(),
                    });
                }
            }
        }

        if artifacts.is_empty() {
            let detail = failures
                .iter()
                .map(|f| format!("{}: {}", f.format, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(if detail.is_empty() {
                "no exporters configured".to_string()
            } else {
                format!("all exporters failed ({})", detail)
            });
        }

        Ok(AssembledReport {
            html,
            artifacts,
            failures,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const SAMPLE: &str = "# Solar Market Review\n\n\
        ## Market Overview\n\n\
        Installed capacity **grew** strongly in 2025.\n\n\
        - Residential: 40%\n\
        - Commercial: 35%\n\
        - Utility: 25%\n\n\
        | Region | Capacity |\n|---|---|\n| South | 12.5 |\n| North | 8 |\n\n\
        > Prices fell again.\n\n\
        ## Conclusions\n\n\
        1. Keep investing\n2. Watch tariffs\n";

    pub fn input() -> ReportInput {
        ReportInput {
            job_id: "job-1".to_string(),
            title: "Solar Market Review".to_string(),
            mode: AnalysisMode::Document,
            config: JobConfig {
                objective: "solar panels".to_string(),
                ..JobConfig::default()
            },
            markdown: SAMPLE.to_string(),
            references: vec![Reference {
                title: "IEA Solar".to_string(),
                url: "https://iea.org/solar".to_string(),
                snippet: "Solar PV capacity additions".to_string(),
            }],
            figures: Vec::new(),
            brand: "Dossier".to_string(),
            generated_at: chrono::NaiveDate::from_ymd_opt(2026, 3, 14)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
                .unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::input;
    use super::*;

    struct Broken(ExportFormat);

    impl Exporter for Broken {
        fn format(&self) -> ExportFormat {
            self.0
        }
        fn export(&self, _input: &ReportInput) -> Result<Vec<u8>, ExportError> {
            Err(ExportError::Disabled(self.0.to_string()))
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ExportFormat::parse(".PDF"), Some(ExportFormat::Pdf));
        assert_eq!(ExportFormat::parse("odt"), None);
        assert_eq!(ExportFormat::Txt.mime(), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_standard_assembler_produces_all_formats() {
        let formats: Vec<String> = ExportFormat::ALL.iter().map(|f| f.to_string()).collect();
        let assembler = ReportAssembler::standard(&formats);
        let report = assembler.assemble(&input()).unwrap();

        assert_eq!(report.artifacts.len(), 4);
        assert!(report.failures.is_empty());
        assert!(report.html.contains("Market Overview"));
    }

    #[test]
    fn test_partial_failure_is_recorded() {
        let assembler = ReportAssembler::new(vec![
            Box::new(Broken(ExportFormat::Pdf)),
            Box::new(TxtExporter),
        ]);
        let report = assembler.assemble(&input()).unwrap();
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].format, ExportFormat::Pdf);
    }

    #[test]
    fn test_all_exporters_failing_is_an_error() {
        let assembler = ReportAssembler::new(
            ExportFormat::ALL
                .iter()
                .map(|f| Box::new(Broken(*f)) as Box<dyn Exporter>)
                .collect(),
        );
        let err = assembler.assemble(&input()).unwrap_err();
        assert!(err.starts_with("all exporters failed"));
        assert!(err.contains("xlsx"));
    }

    #[test]
    fn test_title_resolution() {
        let config = JobConfig {
            objective: "market trends in solar panels".to_string(),
            ..JobConfig::default()
        };
        assert_eq!(ReportInput::resolve_title("# Outlook\ntext", &config), "Outlook");
        assert_eq!(
            ReportInput::resolve_title("no heading", &config),
            "market trends in solar panels"
        );
        assert_eq!(
            ReportInput::resolve_title("", &JobConfig::default()),
            "Relatório de Análise"
        );
    }

    #[test]
    fn test_section_figures_fall_back_to_figures_section() {
        let mut report = input();
        let figure = |placement| Figure {
            caption: "c".to_string(),
            jpeg: vec![0xFF, 0xD8],
            width: 10,
            height: 10,
            placement,
        };
        report.figures = vec![
            figure(Placement::AfterSection("Market Overview".to_string())),
            figure(Placement::AfterSection("Unknown Topic".to_string())),
            figure(Placement::Figures),
        ];
        assert_eq!(report.figures_after("Market Overview").count(), 1);
        assert_eq!(report.section_figures().len(), 2);
    }
}
