//! End-to-end job runs against stub services.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::text_pdf;
use common::harness::{document, run_to_end, topic, TestHarness};
use common::stubs::{BrokenExporter, BrokenExtractor, StalledExtractor, StubEngine, StubSearch};
use dossier::extraction::{ExtractionMethod, PlaintextDecoder, Tier};
use dossier::report::ReportAssembler;
use dossier::{AnalysisMode, CreateJob, ErrorKind, ExportFormat, JobConfig, JobStatus, UploadedDocument};

#[test]
fn test_text_pdf_document_completes_via_fast_extractor() {
    let harness = TestHarness::new();
    let engine = Arc::new(StubEngine::new());
    let orchestrator = harness.pipeline(engine.clone()).start();

    let mut request = document("annual-report.pdf", text_pdf("Revenue grew twelve percent in 2025"));
    request.config.objective = "Summarize the annual report".to_string();
    let view = run_to_end(&orchestrator, request);

    assert!(view.completed, "job failed: {:?}", view.error_message);
    assert!(view.report_available);
    assert!(engine.last_text().contains("Revenue grew"));

    let documents = harness.documents(&view.job_id);
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].extraction_method.as_deref(), Some("fast_pdf"));
    let metadata: serde_json::Value =
        serde_json::from_str(documents[0].extraction_metadata.as_deref().unwrap()).unwrap();
    assert_eq!(metadata["method"], "fast_pdf");

    assert_eq!(
        harness.status_trail(&view.job_id),
        vec![
            JobStatus::Pending,
            JobStatus::Extracting,
            JobStatus::Analyzing,
            JobStatus::Generating,
            JobStatus::Completed,
        ]
    );

    let report = orchestrator.report(&view.job_id).unwrap().unwrap();
    assert_eq!(report.formats.len(), 4);
    assert!(report.html.contains("Summarize the annual report"));

    let pdf = orchestrator.download(&view.job_id, ExportFormat::Pdf).unwrap();
    assert!(pdf.bytes.starts_with(b"%PDF"));
    assert_eq!(pdf.filename, "report_annual-report.pdf");

    orchestrator.shutdown();
}

#[test]
fn test_topic_research_searches_and_clamps_references() {
    let harness = TestHarness::new();
    let engine = Arc::new(StubEngine::new().searching(&["solar panel prices 2026"]));
    let orchestrator = harness
        .pipeline(engine.clone())
        .search(Arc::new(StubSearch::new(12)))
        .start();

    let view = run_to_end(
        &orchestrator,
        CreateJob {
            mode: AnalysisMode::FreeForm,
            documents: Vec::new(),
            config: JobConfig {
                objective: "market trends in solar panels".to_string(),
                source_count: 8,
                ..JobConfig::default()
            },
        },
    );

    assert!(view.completed, "job failed: {:?}", view.error_message);
    let trail = harness.status_trail(&view.job_id);
    assert!(!trail.contains(&JobStatus::Extracting));
    assert!(trail.contains(&JobStatus::Searching));

    let report = orchestrator.report(&view.job_id).unwrap().unwrap();
    assert_eq!(report.references.len(), 8);
    assert_eq!(report.search_payloads.len(), 1);
    assert!(engine.last_text().is_empty());

    orchestrator.shutdown();
}

#[test]
fn test_topic_research_without_search_call_skips_searching_state() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .pipeline(Arc::new(StubEngine::new()))
        .search(Arc::new(StubSearch::new(3)))
        .start();

    let view = run_to_end(&orchestrator, topic("battery storage outlook"));

    assert!(view.completed, "job failed: {:?}", view.error_message);
    assert_eq!(
        harness.status_trail(&view.job_id),
        vec![
            JobStatus::Pending,
            JobStatus::Analyzing,
            JobStatus::Generating,
            JobStatus::Completed,
        ]
    );
    let report = orchestrator.report(&view.job_id).unwrap().unwrap();
    assert!(report.references.is_empty());

    orchestrator.shutdown();
}

#[test]
fn test_search_requested_without_provider_is_a_warning() {
    let harness = TestHarness::new();
    let orchestrator = harness.pipeline(Arc::new(StubEngine::new())).start();

    let mut request = topic("wind farm permits");
    request.config.include_search = true;
    let view = run_to_end(&orchestrator, request);

    assert!(view.completed, "job failed: {:?}", view.error_message);
    assert!(view.warnings.iter().any(|w| w.stage == "searching"));

    orchestrator.shutdown();
}

#[test]
fn test_cascade_falls_back_to_plaintext() {
    let harness = TestHarness::new();
    let engine = Arc::new(StubEngine::new());
    let orchestrator = harness
        .pipeline(engine.clone())
        .cascade(vec![
            Tier::isolated(
                Arc::new(BrokenExtractor(ExtractionMethod::FastPdf)),
                Duration::from_secs(2),
            ),
            Tier::isolated(
                Arc::new(StalledExtractor {
                    method: ExtractionMethod::HeavyParser,
                    duration: Duration::from_secs(10),
                }),
                Duration::from_millis(200),
            ),
            Tier::inline(Arc::new(PlaintextDecoder::new())),
        ])
        .start();

    let view = run_to_end(
        &orchestrator,
        document("memo.txt", "Board approved the merger on Tuesday."),
    );

    assert!(view.completed, "job failed: {:?}", view.error_message);
    assert!(engine.last_text().contains("Board approved the merger"));

    let documents = harness.documents(&view.job_id);
    assert_eq!(documents[0].extraction_method.as_deref(), Some("plaintext"));
    let metadata: serde_json::Value =
        serde_json::from_str(documents[0].extraction_metadata.as_deref().unwrap()).unwrap();
    let outcomes: Vec<&str> = metadata["attempts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(outcomes, vec!["failed", "timed_out", "ok"]);

    orchestrator.shutdown();
}

#[test]
fn test_multi_document_text_is_combined_in_order() {
    let harness = TestHarness::new();
    let engine = Arc::new(StubEngine::new());
    let orchestrator = harness.pipeline(engine.clone()).start();

    let view = run_to_end(
        &orchestrator,
        CreateJob {
            mode: AnalysisMode::MultiDocument,
            documents: vec![
                UploadedDocument::new("first.txt", "Alpha figures."),
                UploadedDocument::new("second.txt", "Beta figures."),
            ],
            config: JobConfig {
                objective: "Compare both".to_string(),
                include_search: false,
                ..JobConfig::default()
            },
        },
    );

    assert!(view.completed, "job failed: {:?}", view.error_message);
    let text = engine.last_text();
    let first = text.find("=== DOCUMENT 1: first.txt ===").unwrap();
    let second = text.find("=== DOCUMENT 2: second.txt ===").unwrap();
    assert!(first < second);
    assert!(text.contains("Beta figures."));

    orchestrator.shutdown();
}

#[test]
fn test_every_exporter_failing_is_an_assembly_failure() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .pipeline(Arc::new(StubEngine::new()))
        .assembler(ReportAssembler::new(vec![
            Box::new(BrokenExporter(ExportFormat::Pdf)),
            Box::new(BrokenExporter(ExportFormat::Docx)),
            Box::new(BrokenExporter(ExportFormat::Xlsx)),
            Box::new(BrokenExporter(ExportFormat::Txt)),
        ]))
        .start();

    let view = run_to_end(&orchestrator, topic("grid capacity"));

    assert!(view.error);
    assert_eq!(view.error_kind, Some(ErrorKind::AssemblyFailure));
    assert!(!view.report_available);
    assert!(orchestrator.report(&view.job_id).unwrap().is_none());

    orchestrator.shutdown();
}

#[test]
fn test_one_failing_exporter_keeps_the_others() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .pipeline(Arc::new(StubEngine::new()))
        .assembler(ReportAssembler::new(vec![
            Box::new(BrokenExporter(ExportFormat::Pdf)),
            Box::new(dossier::report::TxtExporter),
        ]))
        .start();

    let view = run_to_end(&orchestrator, topic("grid capacity"));

    assert!(view.completed, "job failed: {:?}", view.error_message);
    let report = orchestrator.report(&view.job_id).unwrap().unwrap();
    assert_eq!(report.formats, vec![ExportFormat::Txt]);
    assert_eq!(report.export_failures.len(), 1);
    assert!(orchestrator.download(&view.job_id, ExportFormat::Pdf).is_err());

    orchestrator.shutdown();
}
