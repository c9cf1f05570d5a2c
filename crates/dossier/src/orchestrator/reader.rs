use std::path::Path;

use crate::config::Config;
use crate::db::document_repo::{self, DocumentRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{report_repo, Database};
use crate::error::{JobError, Result};
use crate::report::ExportFormat;
use crate::storage::{safe_filename, FileStorage};
use crate::worker::JobStatus;

use super::views::{Download, HistoryPage, HistoryQuery, JobSummary, ReportView, StatusView};

pub(crate) const DEFAULT_HISTORY_LIMIT: u64 = 50;

/// Read side of the job store. Needs no workers and no engine, so status
/// and history queries work without API keys.
#[derive(Clone)]
pub struct JobReader {
    db: Database,
    storage: FileStorage,
}

impl JobReader {
    pub fn new(db: Database, storage: FileStorage) -> Self {
        Self { db, storage }
    }

    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_file())?;
        Ok(Self::new(db, FileStorage::new(config.data_dir())))
    }

    pub fn status(&self, job_id: &str) -> Result<StatusView> {
        let (row, has_report) = self.db.with_conn(|conn| {
            let row = job_repo::find_by_id(conn, job_id)?;
            let has_report = report_repo::find(conn, job_id)?.is_some();
            Ok((row, has_report))
        })?;
        let row = row.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let available = has_report && is_completed(&row);
        Ok(StatusView::from_row(&row, available))
    }

    /// The generated report, or `None` while the job has not completed.
    pub fn report(&self, job_id: &str) -> Result<Option<ReportView>> {
        let (row, report, artifacts) = self.db.with_conn(|conn| {
            let row = job_repo::find_by_id(conn, job_id)?;
            let report = report_repo::find(conn, job_id)?;
            let artifacts = report_repo::list_artifacts(conn, job_id)?;
            Ok((row, report, artifacts))
        })?;
        let row = row.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        // The report row is written before the job is marked completed.
        if !is_completed(&row) {
            return Ok(None);
        }
        Ok(report.map(|report| ReportView::from_rows(&report, &artifacts)))
    }

    /// Reads one exported artifact. A format that was not produced yields
    /// `NotAvailable`.
    pub fn download(&self, job_id: &str, format: ExportFormat) -> Result<Download> {
        let (row, artifact, documents) = self.db.with_conn(|conn| {
            let row = job_repo::find_by_id(conn, job_id)?;
            let artifact = report_repo::find_artifact(conn, job_id, format.as_str())?;
            let documents = document_repo::list_for_job(conn, job_id)?;
            Ok((row, artifact, documents))
        })?;
        let row = row.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let artifact = match artifact {
            Some(artifact) if is_completed(&row) => artifact,
            _ => {
                return Err(JobError::NotAvailable {
                    id: job_id.to_string(),
                    format: format.as_str().to_string(),
                }
                .into())
            }
        };

        let bytes = self.storage.read(Path::new(&artifact.storage_path))?;
        Ok(Download {
            bytes,
            mime: artifact.mime_type,
            filename: download_filename(documents.first(), format),
        })
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let mut filter = query.to_filter();
        let limit = filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        filter.limit = Some(limit);
        filter.offset = Some(offset);

        let (rows, total) = self.db.with_conn(|conn| job_repo::query(conn, &filter))?;
        Ok(HistoryPage {
            jobs: rows.iter().map(JobSummary::from_row).collect(),
            total,
            limit,
            offset,
        })
    }
}

fn is_completed(row: &JobRow) -> bool {
    row.status == JobStatus::Completed.as_str()
}

/// `report_<first document stem>.<ext>`, or `report_topic.<ext>` when the
/// job had no documents.
fn download_filename(first_document: Option<&DocumentRow>, format: ExportFormat) -> String {
    let stem = first_document
        .and_then(|doc| {
            Path::new(&doc.original_filename)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .map(|stem| safe_filename(&stem))
        .unwrap_or_else(|| "topic".to_string());
    format!("report_{}.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::report_repo::ReportRow;

    #[test]
    fn test_download_filename() {
        let doc = DocumentRow {
            id: "d".to_string(),
            job_id: "j".to_string(),
            position: 0,
            original_filename: "../contracts/lease.v2.docx".to_string(),
            declared_type: String::new(),
            storage_path: String::new(),
            size_bytes: 0,
            extracted_text: None,
            extraction_method: None,
            extraction_metadata: None,
            created_at: String::new(),
        };
        assert_eq!(
            download_filename(Some(&doc), ExportFormat::Xlsx),
            "report_lease.v2.xlsx"
        );
        assert_eq!(download_filename(None, ExportFormat::Txt), "report_topic.txt");
    }

    fn job(id: &str, status: JobStatus) -> JobRow {
        JobRow {
            id: id.to_string(),
            mode: "free_form".to_string(),
            config: "{}".to_string(),
            status: status.as_str().to_string(),
            error_kind: None,
            error_message: None,
            processing_log: String::new(),
            attempts: 1,
            elapsed_ms: None,
            warnings: "[]".to_string(),
            created_at: "2026-03-01T10:00:00Z".to_string(),
            updated_at: "2026-03-01T10:00:00Z".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_report_hidden_until_completed() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            job_repo::insert(conn, &job("j1", JobStatus::Generating))?;
            report_repo::upsert(
                conn,
                &ReportRow {
                    job_id: "j1".to_string(),
                    content_html: "<h1>Draft</h1>".to_string(),
                    content_markdown: "# Draft".to_string(),
                    references_json: "[]".to_string(),
                    search_results_raw: "[]".to_string(),
                    reasoning: String::new(),
                    export_failures: "[]".to_string(),
                    created_at: "2026-03-01T10:00:05Z".to_string(),
                },
            )
        })
        .unwrap();
        let reader = JobReader::new(db.clone(), FileStorage::new(dir.path()));

        assert!(reader.report("j1").unwrap().is_none());
        assert!(!reader.status("j1").unwrap().report_available);

        db.with_conn(|conn| job_repo::mark_completed(conn, "j1", 5_000, "2026-03-01T10:00:06Z"))
            .unwrap();

        let report = reader.report("j1").unwrap().unwrap();
        assert_eq!(report.markdown, "# Draft");
        assert!(reader.status("j1").unwrap().report_available);
    }

    #[test]
    fn test_reader_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let reader = JobReader::new(
            Database::open_in_memory().unwrap(),
            FileStorage::new(dir.path()),
        );
        let page = reader.history(&HistoryQuery::default()).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.jobs.is_empty());
        assert!(matches!(
            reader.download("missing", ExportFormat::Pdf),
            Err(crate::error::DossierError::Job(JobError::NotFound(_)))
        ));
    }
}
