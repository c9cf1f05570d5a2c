//! Stand-ins for the engine, search provider, extractors and exporters.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dossier::engine::{
    AnalysisOutput, AnalysisRequest, SearchCapability, SearchHit, SearchResponse,
};
use dossier::error::{EngineError, ExportError, ExtractionError, SearchError};
use dossier::extraction::{CancelToken, DocumentFormat, ExtractionMethod, Extractor};
use dossier::report::{Exporter, ReportInput};
use dossier::{AnalysisEngine, ExportFormat, Reference, SearchProvider};

/// Engine that answers from its inputs. Optionally searches once per
/// query, sleeps before answering, or fails its first attempts.
#[derive(Default)]
pub struct StubEngine {
    queries: Vec<String>,
    delay: Option<Duration>,
    failures_left: AtomicU32,
    calls: AtomicU32,
    last_text: Mutex<String>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches each query when the job grants search.
    pub fn searching(mut self, queries: &[&str]) -> Self {
        self.queries = queries.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first `count` calls fail with an engine error.
    pub fn failing_first(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Document text handed to the most recent call.
    pub fn last_text(&self) -> String {
        self.last_text.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    async fn analyze(
        &self,
        request: &AnalysisRequest,
        search: Option<&SearchCapability>,
    ) -> Result<AnalysisOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = request.document_text.clone();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Status {
                status: 503,
                body: "model overloaded".to_string(),
            });
        }

        let mut references = Vec::new();
        let mut payloads = Vec::new();
        if let Some(search) = search {
            for query in &self.queries {
                if let Ok(response) = search.search(query).await {
                    payloads.push(serde_json::json!({
                        "query": response.query,
                        "results": response.results.len(),
                    }));
                    references.extend(response.results.into_iter().map(|hit| Reference {
                        title: hit.title,
                        url: hit.url,
                        snippet: hit.content,
                    }));
                }
            }
        }

        let title = if request.config.objective.is_empty() {
            "Document review".to_string()
        } else {
            request.config.objective.clone()
        };
        Ok(AnalysisOutput {
            markdown: format!(
                "# {}\n\n## Findings\n\nReviewed {} chars of source text.\n\n## Conclusion\n\nStable outlook.\n",
                title,
                request.document_text.chars().count()
            ),
            references,
            search_payloads: payloads,
            reasoning: format!("Style: {}", request.config.report_style),
        })
    }
}

/// Search provider returning `hits` numbered results for every query.
pub struct StubSearch {
    hits: usize,
}

impl StubSearch {
    pub fn new(hits: usize) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    fn name(&self) -> &str {
        "stub-search"
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let results = (0..self.hits)
            .map(|i| SearchHit {
                title: format!("Result {} for {}", i, query),
                url: format!("https://news.example.org/{}", i),
                content: format!("Snippet {}", i),
                score: 1.0 - i as f64 / 100.0,
            })
            .collect();
        Ok(SearchResponse {
            query: query.to_string(),
            results,
            answer: String::new(),
        })
    }
}

/// Extractor that always fails.
pub struct BrokenExtractor(pub ExtractionMethod);

impl Extractor for BrokenExtractor {
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
        Err(ExtractionError::PdfProcessing("corrupt xref table".to_string()))
    }
}

/// Extractor that works for `duration` unless cancelled first.
pub struct StalledExtractor {
    pub method: ExtractionMethod,
    pub duration: Duration,
}

impl Extractor for StalledExtractor {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    fn supports(&self, _format: DocumentFormat) -> bool {
        true
    }

    fn extract(
        &self,
        bytes: &[u8],
        _format: DocumentFormat,
        cancel: &CancelToken,
    ) -> Result<String, ExtractionError> {
        let started = Instant::now();
        while started.elapsed() < self.duration {
            cancel.check()?;
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(String::from_utf8_lossy(bytes).to_string())
    }
}

/// Exporter that always fails.
pub struct BrokenExporter(pub ExportFormat);

impl Exporter for BrokenExporter {
    fn format(&self) -> ExportFormat {
        self.0
    }

    fn export(&self, _input: &ReportInput) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::Disabled(self.0.as_str().to_string()))
    }
}
