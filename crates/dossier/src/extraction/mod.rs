//! Text extraction for uploaded documents.
//!
//! Extractors are tried in priority order. Each tier gets its own timeout,
//! capped by what is left of the job's budget, and any failure falls
//! through to the next tier. The plaintext tier accepts everything, so a
//! readable file always yields some (possibly empty) text.

pub mod fast;
pub mod heavy;
pub mod ooxml;
pub mod plaintext;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::Budgets;
use crate::error::ExtractionError;
use crate::pipeline::Deadline;

pub use fast::FastPdfExtractor;
pub use heavy::HeavyParser;
pub use plaintext::PlaintextDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Html,
    Text,
    Image,
    Unknown,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => DocumentFormat::Pdf,
            "docx" => DocumentFormat::Docx,
            "pptx" => DocumentFormat::Pptx,
            "xlsx" => DocumentFormat::Xlsx,
            "html" | "htm" => DocumentFormat::Html,
            "txt" | "md" | "markdown" | "csv" | "json" | "tsv" => DocumentFormat::Text,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff" | "tif" | "webp" => {
                DocumentFormat::Image
            }
            _ => DocumentFormat::Unknown,
        }
    }

    pub fn from_filename(filename: &str) -> Self {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(DocumentFormat::Unknown)
    }
}

/// MIME type guessed from a filename, `application/octet-stream` when
/// nothing matches.
pub fn declared_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    FastPdf,
    HeavyParser,
    Plaintext,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::FastPdf => "fast_pdf",
            ExtractionMethod::HeavyParser => "heavy_parser",
            ExtractionMethod::Plaintext => "plaintext",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared with an extractor thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ExtractionError> {
        if self.is_cancelled() {
            Err(ExtractionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One strategy of the cascade. Implementations are synchronous and should
/// poll `cancel` between units of work.
pub trait Extractor: Send + Sync {
    fn method(&self) -> ExtractionMethod;
    fn supports(&self, format: DocumentFormat) -> bool;
    fn extract(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        cancel: &CancelToken,
    ) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub path: PathBuf,
    pub filename: String,
    pub format: DocumentFormat,
}

impl DocumentInput {
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            path: path.into(),
            format: DocumentFormat::from_filename(&filename),
            filename,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    Failed,
    TimedOut,
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: ExtractionMethod,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    #[serde(skip)]
    pub text: String,
    pub method: ExtractionMethod,
    pub attempts: Vec<TierAttempt>,
    pub chars: usize,
    pub elapsed_ms: u64,
}

impl ExtractionOutcome {
    pub fn metadata_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A cascade entry. `timeout: None` runs the extractor inline on the
/// calling task; otherwise it runs on a dedicated thread.
pub struct Tier {
    pub extractor: Arc<dyn Extractor>,
    pub timeout: Option<Duration>,
}

impl Tier {
    pub fn isolated(extractor: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self {
            extractor,
            timeout: Some(timeout),
        }
    }

    pub fn inline(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            timeout: None,
        }
    }
}

enum TierFailure {
    TimedOut,
    Failed(ExtractionError),
}

pub struct ExtractionCascade {
    tiers: Vec<Tier>,
}

impl ExtractionCascade {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// fast_pdf, then heavy_parser, then plaintext.
    pub fn standard(budgets: &Budgets) -> Self {
        Self::new(vec![
            Tier::isolated(Arc::new(FastPdfExtractor::new()), budgets.fast_extractor),
            Tier::isolated(Arc::new(HeavyParser::new()), budgets.heavy_parser),
            Tier::inline(Arc::new(PlaintextDecoder::new())),
        ])
    }

    /// Extracts text from one stored document. Fails only when the file
    /// cannot be read.
    pub async fn extract(
        &self,
        input: &DocumentInput,
        deadline: &Deadline,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let started = Instant::now();
        let bytes: Arc<[u8]> = tokio::fs::read(&input.path)
            .await
            .map_err(|e| ExtractionError::ReadDocument {
                path: input.path.clone(),
                source: e,
            })?
            .into();

        let mut attempts = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            let method = tier.extractor.method();
            if !tier.extractor.supports(input.format) {
                attempts.push(TierAttempt {
                    tier: method,
                    outcome: AttemptOutcome::Unsupported,
                    elapsed_ms: 0,
                    error: None,
                });
                continue;
            }

            let tier_started = Instant::now();
            let result = match tier.timeout {
                Some(limit) => {
                    run_isolated(
                        tier.extractor.clone(),
                        bytes.clone(),
                        input.format,
                        deadline.cap(limit),
                    )
                    .await
                }
                None => tier
                    .extractor
                    .extract(&bytes, input.format, &CancelToken::new())
                    .map_err(TierFailure::Failed),
            };
            let elapsed_ms = millis(tier_started.elapsed());

            match result {
                Ok(text) => {
                    attempts.push(TierAttempt {
                        tier: method,
                        outcome: AttemptOutcome::Ok,
                        elapsed_ms,
                        error: None,
                    });
                    tracing::debug!(
                        tier = %method,
                        chars = text.chars().count(),
                        elapsed_ms,
                        "Extraction tier succeeded"
                    );
                    return Ok(finish(text, method, attempts, started));
                }
                Err(TierFailure::TimedOut) => {
                    tracing::warn!(tier = %method, elapsed_ms, "Extraction tier timed out");
                    attempts.push(TierAttempt {
                        tier: method,
                        outcome: AttemptOutcome::TimedOut,
                        elapsed_ms,
                        error: None,
                    });
                }
                Err(TierFailure::Failed(e)) => {
                    tracing::debug!(tier = %method, error = %e, "Extraction tier failed");
                    attempts.push(TierAttempt {
                        tier: method,
                        outcome: AttemptOutcome::Failed,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // Every configured tier failed; decode directly so a readable file
        // still produces an outcome.
        let text = plaintext::decode(&bytes);
        Ok(finish(text, ExtractionMethod::Plaintext, attempts, started))
    }
}

fn finish(
    text: String,
    method: ExtractionMethod,
    attempts: Vec<TierAttempt>,
    started: Instant,
) -> ExtractionOutcome {
    ExtractionOutcome {
        chars: text.chars().count(),
        text,
        method,
        attempts,
        elapsed_ms: millis(started.elapsed()),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Sets the token when dropped, so a caller that abandons the future
/// (an outer timeout, say) still stops the thread.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs an extractor on its own thread. On timeout, or when the future is
/// dropped, the cancel flag is set and the thread is left to finish on its
/// own.
async fn run_isolated(
    extractor: Arc<dyn Extractor>,
    bytes: Arc<[u8]>,
    format: DocumentFormat,
    limit: Duration,
) -> Result<String, TierFailure> {
    if limit.is_zero() {
        return Err(TierFailure::TimedOut);
    }

    let cancel = CancelOnDrop(CancelToken::new());
    let thread_cancel = cancel.0.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();

    std::thread::Builder::new()
        .name(format!("extract-{}", extractor.method()))
        .spawn(move || {
            let result = extractor.extract(&bytes, format, &thread_cancel);
            let _ = tx.send(result);
        })
        .map_err(|_| TierFailure::Failed(ExtractionError::WorkerLost))?;

    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(result)) => result.map_err(TierFailure::Failed),
        // Sender dropped without a value: the thread panicked.
        Ok(Err(_)) => Err(TierFailure::Failed(ExtractionError::WorkerLost)),
        Err(_) => {
            cancel.0.cancel();
            Err(TierFailure::TimedOut)
        }
    }
}

/// Joins per-document texts for multi-document analysis.
pub fn combine_documents<'a, I>(documents: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut combined = String::new();
    for (index, (filename, text)) in documents.into_iter().enumerate() {
        if index > 0 {
            combined.push_str("\n\n");
        }
        combined.push_str(&format!("=== DOCUMENT {}: {} ===\n", index + 1, filename));
        combined.push_str(text.trim_end());
        combined.push('\n');
    }
    combined
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Failing(ExtractionMethod);

    impl Extractor for Failing {
        fn method(&self) -> ExtractionMethod {
            self.0
        }
        fn supports(&self, _format: DocumentFormat) -> bool {
            true
        }
        fn extract(
            &self,
            _bytes: &[u8],
            _format: DocumentFormat,
            _cancel: &CancelToken,
        ) -> Result<String, ExtractionError> {
            Err(ExtractionError::PdfProcessing("broken".to_string()))
        }
    }

    struct Sleeping;

    impl Extractor for Sleeping {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::HeavyParser
        }
        fn supports(&self, _format: DocumentFormat) -> bool {
            true
        }
        fn extract(
            &self,
            _bytes: &[u8],
            _format: DocumentFormat,
            cancel: &CancelToken,
        ) -> Result<String, ExtractionError> {
            for _ in 0..200 {
                cancel.check()?;
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok("too late".to_string())
        }
    }

    /// Spins until cancelled and records that it saw the flag.
    struct Watching(Arc<AtomicBool>);

    impl Extractor for Watching {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::HeavyParser
        }
        fn supports(&self, _format: DocumentFormat) -> bool {
            true
        }
        fn extract(
            &self,
            _bytes: &[u8],
            _format: DocumentFormat,
            cancel: &CancelToken,
        ) -> Result<String, ExtractionError> {
            for _ in 0..1000 {
                if cancel.is_cancelled() {
                    self.0.store(true, Ordering::SeqCst);
                    return Err(ExtractionError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok("never cancelled".to_string())
        }
    }

    fn write_temp(suffix: &str, content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(DocumentFormat::from_filename("a.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("notes.md"), DocumentFormat::Text);
        assert_eq!(DocumentFormat::from_filename("deck.pptx"), DocumentFormat::Pptx);
        assert_eq!(DocumentFormat::from_filename("scan.jpeg"), DocumentFormat::Image);
        assert_eq!(DocumentFormat::from_filename("noext"), DocumentFormat::Unknown);
    }

    #[test]
    fn test_declared_type() {
        assert_eq!(declared_type("report.pdf"), "application/pdf");
        assert_eq!(declared_type("mystery.zzz"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_standard_cascade_uses_fast_pdf() {
        let file = write_temp(".pdf", &test_support::text_pdf("Quarterly revenue grew"));
        let cascade = ExtractionCascade::standard(&Budgets::default());
        let input = DocumentInput::new(file.path(), "q3.pdf");

        let outcome = cascade
            .extract(&input, &Deadline::start(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(outcome.method, ExtractionMethod::FastPdf);
        assert!(outcome.text.contains("Quarterly revenue grew"));
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_text_file_skips_pdf_tier() {
        let file = write_temp(".txt", "plain notes".as_bytes());
        let cascade = ExtractionCascade::standard(&Budgets::default());
        let input = DocumentInput::new(file.path(), "notes.txt");

        let outcome = cascade
            .extract(&input, &Deadline::start(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(outcome.method, ExtractionMethod::HeavyParser);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Unsupported);
        assert_eq!(outcome.text.trim(), "plain notes");
    }

    #[tokio::test]
    async fn test_timeout_falls_through_to_plaintext() {
        let file = write_temp(".txt", b"fallback body");
        let cascade = ExtractionCascade::new(vec![
            Tier::isolated(
                Arc::new(Failing(ExtractionMethod::FastPdf)),
                Duration::from_secs(1),
            ),
            Tier::isolated(Arc::new(Sleeping), Duration::from_millis(50)),
            Tier::inline(Arc::new(PlaintextDecoder::new())),
        ]);
        let input = DocumentInput::new(file.path(), "body.txt");

        let outcome = cascade
            .extract(&input, &Deadline::start(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(outcome.method, ExtractionMethod::Plaintext);
        assert_eq!(outcome.text, "fallback body");
        let outcomes: Vec<_> = outcome.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Failed,
                AttemptOutcome::TimedOut,
                AttemptOutcome::Ok
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_extraction_cancels_thread() {
        let file = write_temp(".txt", b"body");
        let cancelled = Arc::new(AtomicBool::new(false));
        let cascade = ExtractionCascade::new(vec![Tier::isolated(
            Arc::new(Watching(Arc::clone(&cancelled))),
            Duration::from_secs(30),
        )]);
        let input = DocumentInput::new(file.path(), "body.txt");
        let deadline = Deadline::start(Duration::from_secs(30));

        let result =
            tokio::time::timeout(Duration::from_millis(200), cascade.extract(&input, &deadline))
                .await;
        assert!(result.is_err());

        for _ in 0..200 {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_binary_without_tiers_yields_empty_text() {
        let file = write_temp(".bin", &[0xff, 0xfe, 0x00, 0x81]);
        let cascade = ExtractionCascade::new(vec![Tier::inline(Arc::new(Failing(
            ExtractionMethod::HeavyParser,
        )))]);
        let input = DocumentInput::new(file.path(), "blob.bin");

        let outcome = cascade
            .extract(&input, &Deadline::start(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(outcome.method, ExtractionMethod::Plaintext);
        assert!(outcome.text.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_terminal() {
        let cascade = ExtractionCascade::standard(&Budgets::default());
        let input = DocumentInput::new("/nonexistent/doc.pdf", "doc.pdf");

        let result = cascade
            .extract(&input, &Deadline::start(Duration::from_secs(5)))
            .await;

        match result {
            Err(ExtractionError::ReadDocument { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/doc.pdf"));
            }
            _ => panic!("Expected ReadDocument error"),
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_isolated_tiers() {
        let file = write_temp(".pdf", &test_support::text_pdf("Ignored"));
        let cascade = ExtractionCascade::standard(&Budgets::default());
        let input = DocumentInput::new(file.path(), "late.pdf");

        let outcome = cascade
            .extract(&input, &Deadline::start(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(outcome.method, ExtractionMethod::Plaintext);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::TimedOut);
    }

    #[test]
    fn test_metadata_json_omits_text() {
        let outcome = ExtractionOutcome {
            text: "secret body".to_string(),
            method: ExtractionMethod::FastPdf,
            attempts: vec![],
            chars: 11,
            elapsed_ms: 4,
        };
        let json = outcome.metadata_json();
        assert!(json.contains("\"method\":\"fast_pdf\""));
        assert!(!json.contains("secret body"));
    }

    #[test]
    fn test_combine_documents_markers() {
        let combined = combine_documents([("a.pdf", "alpha"), ("b.docx", "beta\n")]);
        assert_eq!(
            combined,
            "=== DOCUMENT 1: a.pdf ===\nalpha\n\n\n=== DOCUMENT 2: b.docx ===\nbeta\n"
        );
    }
}
