use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use crate::config::{Budgets, Config};
use crate::db::document_repo;
use crate::db::report_repo::{self, ArtifactRow, ReportRow};
use crate::db::{self, job_repo, Database};
use crate::engine::{
    dedupe_references, plan_research, AnalysisEngine, AnalysisOutput, AnalysisRequest,
    OpenAiEngine, SearchCapability, SearchProvider, TavilySearch,
};
use crate::error::{DossierError, EngineError};
use crate::extraction::{combine_documents, DocumentInput, ExtractionCascade};
use crate::images::ImageChain;
use crate::report::{detect_charts, Figure, ReportAssembler, ReportInput};
use crate::sanitize;
use crate::storage::FileStorage;
use crate::worker::job::JobResult;
use crate::worker::{AnalysisMode, JobConfig, JobStatus};

use super::context::{PipelineContext, StatusWriter};
use super::deadline::Deadline;
use super::error::PipelineError;
use super::progress::ProgressReporter;

/// Runs analysis jobs end to end. Cheap to clone; every collaborator is
/// shared.
#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    storage: FileStorage,
    cascade: Arc<ExtractionCascade>,
    engine: Arc<dyn AnalysisEngine>,
    search: Option<Arc<dyn SearchProvider>>,
    images: Arc<ImageChain>,
    assembler: Arc<ReportAssembler>,
    budgets: Budgets,
    brand: String,
}

impl Pipeline {
    /// Production constructor: OpenAI engine, Tavily search when a key is
    /// configured, the standard extraction cascade and every configured
    /// export format.
    pub fn from_config(config: &Config, db: Database) -> Result<Self, DossierError> {
        let budgets = config.budget.budgets();
        let engine = OpenAiEngine::from_config(&config.engine, &config.report.brand)?;
        let search = match TavilySearch::from_config(&config.search)? {
            Some(search) => Some(Arc::new(search) as Arc<dyn SearchProvider>),
            None => {
                log::info!("No search key configured, web search disabled");
                None
            }
        };

        Ok(Self::new(
            db,
            FileStorage::new(config.data_dir()),
            Arc::new(engine),
            budgets,
        )
        .with_search(search)
        .with_images(ImageChain::from_config(&config.images))
        .with_assembler(ReportAssembler::standard(&config.report.formats))
        .with_brand(&config.report.brand))
    }

    /// Minimal pipeline: standard cascade and exporters, no search, images
    /// rendered locally only.
    pub fn new(
        db: Database,
        storage: FileStorage,
        engine: Arc<dyn AnalysisEngine>,
        budgets: Budgets,
    ) -> Self {
        Self {
            db,
            storage,
            cascade: Arc::new(ExtractionCascade::standard(&budgets)),
            engine,
            search: None,
            images: Arc::new(ImageChain::new(Vec::new(), crate::images::MAX_IMAGES)),
            assembler: Arc::new(ReportAssembler::standard(&[
                "pdf".to_string(),
                "docx".to_string(),
                "xlsx".to_string(),
                "txt".to_string(),
            ])),
            budgets,
            brand: "Dossier".to_string(),
        }
    }

    pub fn with_cascade(mut self, cascade: ExtractionCascade) -> Self {
        self.cascade = Arc::new(cascade);
        self
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchProvider>>) -> Self {
        self.search = search;
        self
    }

    pub fn with_images(mut self, images: ImageChain) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn with_assembler(mut self, assembler: ReportAssembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        self.brand = brand.to_string();
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn budgets(&self) -> Budgets {
        self.budgets
    }

    /// Runs one attempt of a `pending` job. Every failure ends with the job
    /// in `error`, its artifacts deleted and no report row.
    pub async fn run(&self, job_id: &str, progress: Arc<dyn ProgressReporter>) -> JobResult {
        let deadline = Deadline::start(self.budgets.total);
        let writer = StatusWriter::new(self.db.clone(), job_id, deadline, progress);
        let span = info_span!("pipeline", job_id = %job_id, mode = tracing::field::Empty);

        async {
            let mut ctx = match self.load(job_id, deadline) {
                Ok(ctx) => ctx,
                Err(e @ PipelineError::Corrupt(_)) => {
                    self.abort(job_id, &writer, &e);
                    return JobResult::failure(job_id, JobStatus::Error, &e, deadline.elapsed_ms());
                }
                Err(e) => {
                    warn!(error = %e, "Job not runnable, skipping");
                    return JobResult::failure(job_id, writer.current(), &e, 0);
                }
            };
            tracing::Span::current().record("mode", ctx.mode.as_str());

            let outcome =
                match tokio::time::timeout(deadline.remaining(), self.execute(&mut ctx, &writer))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PipelineError::Timeout {
                        stage: writer.current().as_str().to_string(),
                        elapsed: deadline.elapsed(),
                        budget: deadline.budget(),
                    }),
                };

            match outcome {
                Ok(()) => JobResult::completed(job_id, deadline.elapsed_ms()),
                Err(e) => {
                    self.save_warnings(&ctx);
                    self.abort(job_id, &writer, &e);
                    JobResult::failure(job_id, JobStatus::Error, &e, deadline.elapsed_ms())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Reads the job and claims it: `pending` only, attempt counter bumped.
    fn load(&self, job_id: &str, deadline: Deadline) -> Result<PipelineContext, PipelineError> {
        let (row, documents) = self.db.with_conn(|conn| {
            let row = job_repo::find_by_id(conn, job_id)?;
            let documents = document_repo::list_for_job(conn, job_id)?;
            Ok((row, documents))
        })?;
        let row = row.ok_or_else(|| PipelineError::Conflict(job_id.to_string()))?;
        if row.status != JobStatus::Pending.as_str() {
            return Err(PipelineError::Conflict(job_id.to_string()));
        }

        let mode = AnalysisMode::parse(&row.mode)
            .ok_or_else(|| PipelineError::Corrupt(format!("unknown mode '{}'", row.mode)))?;
        let config: JobConfig = serde_json::from_str(&row.config)
            .map_err(|e| PipelineError::Corrupt(format!("configuration: {}", e)))?;

        if !self
            .db
            .with_conn(|conn| job_repo::mark_started(conn, job_id, &db::now()))?
        {
            return Err(PipelineError::Conflict(job_id.to_string()));
        }

        Ok(PipelineContext::new(job_id, mode, config, documents, deadline))
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        writer: &StatusWriter,
    ) -> Result<(), PipelineError> {
        if ctx.mode.needs_documents() {
            writer.advance(
                JobStatus::Extracting,
                &format!("Extracting text from {} document(s)", ctx.documents.len()),
            )?;
            self.step_extract(ctx, writer)
                .instrument(info_span!("extract"))
                .await?;
        }

        writer.advance(JobStatus::Analyzing, "Analyzing content")?;
        let analysis = self
            .step_analyze(ctx, writer)
            .instrument(info_span!("analyze"))
            .await?;

        writer.advance(JobStatus::Generating, "Generating report")?;
        self.step_generate(ctx, writer, analysis)
            .instrument(info_span!("generate"))
            .await?;

        writer.complete()
    }

    async fn step_extract(
        &self,
        ctx: &mut PipelineContext,
        writer: &StatusWriter,
    ) -> Result<(), PipelineError> {
        let mut texts = Vec::with_capacity(ctx.documents.len());

        for doc in &ctx.documents {
            ctx.deadline.check("extracting")?;
            let filename = sanitize::redact_path(Path::new(&doc.original_filename));

            let text = match &doc.extracted_text {
                // Written once; a retry reuses it.
                Some(text) => {
                    writer.log(&format!(
                        "[Extraction] {}: reusing extracted text ({} chars)",
                        filename,
                        text.chars().count()
                    ))?;
                    text.clone()
                }
                None => {
                    let input = DocumentInput::new(&doc.storage_path, &doc.original_filename);
                    let outcome = self.cascade.extract(&input, &ctx.deadline).await?;
                    self.db.with_conn(|conn| {
                        document_repo::record_extraction(
                            conn,
                            &doc.id,
                            &outcome.text,
                            outcome.method.as_str(),
                            &outcome.metadata_json(),
                        )
                    })?;
                    debug!(file = %filename, method = %outcome.method, chars = outcome.chars, "Document extracted");
                    writer.log(&format!(
                        "[Extraction] {}: {} ({} chars, {} ms)",
                        filename, outcome.method, outcome.chars, outcome.elapsed_ms
                    ))?;
                    outcome.text
                }
            };
            texts.push((doc.original_filename.clone(), text));
        }

        ctx.source_text = match ctx.mode {
            AnalysisMode::MultiDocument => {
                combine_documents(texts.iter().map(|(name, text)| (name.as_str(), text.as_str())))
            }
            _ => texts.into_iter().next().map(|(_, text)| text).unwrap_or_default(),
        };

        if ctx.source_text.trim().is_empty() {
            ctx.warn("extracting", "no text could be extracted from the documents");
        }
        Ok(())
    }

    async fn step_analyze(
        &self,
        ctx: &mut PipelineContext,
        writer: &StatusWriter,
    ) -> Result<AnalysisOutput, PipelineError> {
        let capability = match (&self.search, ctx.config.grants_search(ctx.mode)) {
            (Some(provider), true) => {
                let observer = writer.clone();
                Some(
                    SearchCapability::new(Arc::clone(provider))
                        .with_geography(&ctx.config.geography)
                        .on_first_call(move || {
                            if let Err(e) =
                                observer.advance(JobStatus::Searching, "Searching for references")
                            {
                                warn!(error = %e, "Could not record searching state");
                            }
                        }),
                )
            }
            (None, true) => {
                ctx.warn("searching", "web search requested but no search provider is configured");
                None
            }
            (_, false) => None,
        };

        let plan = plan_research(ctx.mode, &ctx.config, &ctx.source_text, capability.is_some());
        for line in &plan.log_lines {
            writer.log(line)?;
        }

        let request = AnalysisRequest {
            job_id: ctx.job_id.clone(),
            mode: ctx.mode,
            config: ctx.config.clone(),
            document_text: ctx.source_text.clone(),
            plan: Some(plan),
        };

        let limit = ctx.deadline.cap(self.budgets.engine);
        let output = match tokio::time::timeout(
            limit,
            self.engine.analyze(&request, capability.as_ref()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(PipelineError::Timeout {
                    stage: writer.current().as_str().to_string(),
                    elapsed: ctx.deadline.elapsed(),
                    budget: ctx.deadline.budget(),
                })
            }
        };
        ctx.plan = request.plan;

        if output.markdown.trim().is_empty() {
            return Err(EngineError::EmptyReport.into());
        }

        if let Some(search) = &capability {
            let failures = search.failure_count();
            if failures > 0 {
                ctx.warn("searching", format!("{} search call(s) failed", failures));
            }
        }

        ctx.references = dedupe_references(
            output.references.clone(),
            ctx.config.source_count as usize,
        );
        writer.log(&format!(
            "[Engine] {}: {} chars, {} reference(s), {} search call(s)",
            self.engine.name(),
            output.markdown.chars().count(),
            ctx.references.len(),
            capability.as_ref().map(|s| s.call_count()).unwrap_or(0)
        ))?;

        Ok(output)
    }

    async fn step_generate(
        &self,
        ctx: &mut PipelineContext,
        writer: &StatusWriter,
        analysis: AnalysisOutput,
    ) -> Result<(), PipelineError> {
        if ctx.config.include_images {
            let requests = match ctx.mode {
                AnalysisMode::Enhancement => self
                    .images
                    .enhancement_requests(&ctx.source_text, &ctx.config),
                _ => self.images.standard_requests(&analysis.markdown, &ctx.config),
            };
            let batch = self.images.render_all(requests).await;
            for warning in batch.warnings {
                ctx.warn("images", warning);
            }
            writer.log(&format!("[Images] {} illustration(s)", batch.images.len()))?;
            ctx.figures
                .extend(batch.images.into_iter().map(Figure::from));
        }

        let charts = detect_charts(&analysis.markdown, ctx.config.locale);
        if !charts.is_empty() {
            writer.log(&format!("[Charts] {} chart(s) from report data", charts.len()))?;
        }
        ctx.figures.extend(charts);
        ctx.deadline.check("generating")?;

        let input = ReportInput {
            job_id: ctx.job_id.clone(),
            title: ReportInput::resolve_title(&analysis.markdown, &ctx.config),
            mode: ctx.mode,
            config: ctx.config.clone(),
            markdown: analysis.markdown.clone(),
            references: ctx.references.clone(),
            figures: std::mem::take(&mut ctx.figures),
            brand: self.brand.clone(),
            generated_at: chrono::Local::now().naive_local(),
        };

        // Exporters are CPU-bound.
        let assembler = Arc::clone(&self.assembler);
        let assembled = tokio::task::spawn_blocking(move || assembler.assemble(&input))
            .await
            .map_err(|e| PipelineError::Assembly(format!("assembler task failed: {}", e)))?
            .map_err(PipelineError::Assembly)?;

        for failure in &assembled.failures {
            ctx.warn(
                "generating",
                format!("{} export failed: {}", failure.format, failure.error),
            );
        }
        ctx.deadline.check("generating")?;

        let now = db::now();
        let mut artifacts = Vec::with_capacity(assembled.artifacts.len());
        for artifact in &assembled.artifacts {
            let path =
                self.storage
                    .store_artifact(&ctx.job_id, artifact.format.extension(), &artifact.bytes)?;
            artifacts.push(ArtifactRow {
                job_id: ctx.job_id.clone(),
                format: artifact.format.as_str().to_string(),
                storage_path: path.to_string_lossy().to_string(),
                size_bytes: i64::try_from(artifact.bytes.len()).unwrap_or(i64::MAX),
                mime_type: artifact.format.mime().to_string(),
                created_at: now.clone(),
            });
        }

        let report = ReportRow {
            job_id: ctx.job_id.clone(),
            content_html: assembled.html,
            content_markdown: analysis.markdown,
            references_json: to_json(&ctx.references),
            search_results_raw: to_json(&analysis.search_payloads),
            reasoning: analysis.reasoning,
            export_failures: to_json(&assembled.failures),
            created_at: now,
        };
        let warnings = to_json(&ctx.warnings);

        self.db.with_tx(|tx| {
            report_repo::delete_for_job(tx, &ctx.job_id)?;
            report_repo::upsert(tx, &report)?;
            for artifact in &artifacts {
                report_repo::insert_artifact(tx, artifact)?;
            }
            job_repo::set_warnings(tx, &ctx.job_id, &warnings)?;
            Ok(())
        })?;
        writer.log(&format!(
            "[Report] {} artifact(s): {}",
            artifacts.len(),
            artifacts
                .iter()
                .map(|a| a.format.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))?;

        Ok(())
    }

    fn save_warnings(&self, ctx: &PipelineContext) {
        let warnings = to_json(&ctx.warnings);
        if let Err(e) = self
            .db
            .with_conn(|conn| job_repo::set_warnings(conn, &ctx.job_id, &warnings))
        {
            warn!(error = %e, "Could not store warnings");
        }
    }

    /// Discards everything the attempt produced, then records the failure.
    fn abort(&self, job_id: &str, writer: &StatusWriter, error: &PipelineError) {
        warn!(error = %error, kind = %error.kind(), "Job failed");

        if let Err(e) = self.storage.remove_artifacts(job_id) {
            warn!(error = %e, "Could not delete artifacts of failed attempt");
        }
        if let Err(e) = self
            .db
            .with_conn(|conn| report_repo::delete_for_job(conn, job_id))
        {
            warn!(error = %e, "Could not delete report of failed attempt");
        }
        if let Err(e) = writer.fail(error) {
            tracing::error!(error = %e, "Could not record job failure");
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::db::job_repo::JobRow;
    use crate::engine::Reference;
    use crate::pipeline::progress::RecordingProgress;

    struct FixedEngine {
        markdown: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl AnalysisEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn analyze(
            &self,
            request: &AnalysisRequest,
            _search: Option<&SearchCapability>,
        ) -> Result<AnalysisOutput, EngineError> {
            tokio::time::sleep(self.delay).await;
            Ok(AnalysisOutput {
                markdown: self.markdown.to_string(),
                references: (0..10)
                    .map(|i| Reference {
                        title: format!("Source {}", i),
                        url: format!("https://example.com/{}", i),
                        snippet: String::new(),
                    })
                    .collect(),
                search_payloads: Vec::new(),
                reasoning: format!("objective: {}", request.config.objective),
            })
        }
    }

    fn pipeline(
        dir: &Path,
        engine: FixedEngine,
        total: Duration,
    ) -> (Pipeline, Database) {
        let db = Database::open_in_memory().unwrap();
        let budgets = Budgets {
            total,
            ..Budgets::default()
        };
        let pipeline = Pipeline::new(
            db.clone(),
            FileStorage::new(dir),
            Arc::new(engine),
            budgets,
        );
        (pipeline, db)
    }

    fn insert_topic_job(db: &Database, id: &str, source_count: u32) {
        let config = JobConfig {
            objective: "solar panel market".to_string(),
            source_count,
            include_search: false,
            ..JobConfig::default()
        };
        db.with_conn(|conn| {
            job_repo::insert(
                conn,
                &JobRow {
                    id: id.to_string(),
                    mode: "free_form".to_string(),
                    config: serde_json::to_string(&config).unwrap(),
                    status: "pending".to_string(),
                    error_kind: None,
                    error_message: None,
                    processing_log: String::new(),
                    attempts: 0,
                    elapsed_ms: None,
                    warnings: "[]".to_string(),
                    created_at: db::now(),
                    updated_at: db::now(),
                    started_at: None,
                    completed_at: None,
                },
            )
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_topic_job_completes_and_clamps_references() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, db) = pipeline(
            dir.path(),
            FixedEngine {
                markdown: "# Solar\n\n## Trends\n\nGrowth continues.\n",
                delay: Duration::ZERO,
            },
            Duration::from_secs(60),
        );
        insert_topic_job(&db, "j1", 3);

        let progress = Arc::new(RecordingProgress::default());
        let result = pipeline.run("j1", progress.clone()).await;

        assert!(result.success(), "{:?}", result.error);
        assert_eq!(
            progress.statuses(),
            vec![JobStatus::Analyzing, JobStatus::Generating, JobStatus::Completed]
        );

        let (row, report, artifacts) = db
            .with_conn(|conn| {
                Ok((
                    job_repo::find_by_id(conn, "j1")?.unwrap(),
                    report_repo::find(conn, "j1")?.unwrap(),
                    report_repo::list_artifacts(conn, "j1")?,
                ))
            })
            .unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.attempts, 1);
        assert!(row.elapsed_ms.is_some());
        let references: Vec<Reference> = serde_json::from_str(&report.references_json).unwrap();
        assert_eq!(references.len(), 3);
        assert_eq!(artifacts.len(), 4);
        assert!(dir.path().join("artifacts/j1/report.pdf").exists());
    }

    #[tokio::test]
    async fn test_empty_markdown_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, db) = pipeline(
            dir.path(),
            FixedEngine {
                markdown: "   ",
                delay: Duration::ZERO,
            },
            Duration::from_secs(60),
        );
        insert_topic_job(&db, "j1", 5);

        let result = pipeline.run("j1", Arc::new(RecordingProgress::default())).await;
        assert_eq!(result.status, JobStatus::Error);
        assert_eq!(result.error_kind, Some(crate::pipeline::ErrorKind::EngineFailure));

        let row = db
            .with_conn(|conn| Ok(job_repo::find_by_id(conn, "j1")?.unwrap()))
            .unwrap();
        assert_eq!(row.status, "error");
        assert_eq!(row.error_kind.as_deref(), Some("engine_failure"));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, db) = pipeline(
            dir.path(),
            FixedEngine {
                markdown: "# Late\n",
                delay: Duration::from_secs(5),
            },
            Duration::from_millis(200),
        );
        insert_topic_job(&db, "j1", 5);

        let result = pipeline.run("j1", Arc::new(RecordingProgress::default())).await;
        assert_eq!(
            result.error_kind,
            Some(crate::pipeline::ErrorKind::TimeoutExceeded)
        );
        let report = db
            .with_conn(|conn| report_repo::find(conn, "j1"))
            .unwrap();
        assert!(report.is_none());
        assert!(!dir.path().join("artifacts/j1").exists());
    }

    #[tokio::test]
    async fn test_job_not_pending_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, db) = pipeline(
            dir.path(),
            FixedEngine {
                markdown: "# X\n",
                delay: Duration::ZERO,
            },
            Duration::from_secs(60),
        );
        insert_topic_job(&db, "j1", 5);
        db.with_conn(|conn| job_repo::transition(conn, "j1", "pending", "analyzing", "t"))
            .unwrap();

        let result = pipeline.run("j1", Arc::new(RecordingProgress::default())).await;
        assert!(!result.success());
        let row = db
            .with_conn(|conn| Ok(job_repo::find_by_id(conn, "j1")?.unwrap()))
            .unwrap();
        // Untouched: the other run owns it.
        assert_eq!(row.status, "analyzing");
        assert_eq!(row.attempts, 0);
    }
}
