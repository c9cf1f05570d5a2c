//! Generated reports and their exported artifacts.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub job_id: String,
    pub content_html: String,
    pub content_markdown: String,
    pub references_json: String,
    pub search_results_raw: String,
    pub reasoning: String,
    pub export_failures: String,
    pub created_at: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            content_html: row.get("content_html")?,
            content_markdown: row.get("content_markdown")?,
            references_json: row.get("references_json")?,
            search_results_raw: row.get("search_results_raw")?,
            reasoning: row.get("reasoning")?,
            export_failures: row.get("export_failures")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactRow {
    pub job_id: String,
    pub format: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: String,
}

impl ArtifactRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            format: row.get("format")?,
            storage_path: row.get("storage_path")?,
            size_bytes: row.get("size_bytes")?,
            mime_type: row.get("mime_type")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts the report for a job, replacing any previous one.
pub fn upsert(conn: &Connection, report: &ReportRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO reports (job_id, content_html, content_markdown, references_json,
         search_results_raw, reasoning, export_failures, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.job_id,
            report.content_html,
            report.content_markdown,
            report.references_json,
            report.search_results_raw,
            report.reasoning,
            report.export_failures,
            report.created_at,
        ],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, job_id: &str) -> Result<Option<ReportRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM reports WHERE job_id = ?1")?;
    let mut rows = stmt.query_map(params![job_id], ReportRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn insert_artifact(conn: &Connection, artifact: &ArtifactRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO artifacts (job_id, format, storage_path, size_bytes, mime_type,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            artifact.job_id,
            artifact.format,
            artifact.storage_path,
            artifact.size_bytes,
            artifact.mime_type,
            artifact.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_artifacts(conn: &Connection, job_id: &str) -> Result<Vec<ArtifactRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM artifacts WHERE job_id = ?1 ORDER BY format")?;
    let rows = stmt
        .query_map(params![job_id], ArtifactRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_artifact(
    conn: &Connection,
    job_id: &str,
    format: &str,
) -> Result<Option<ArtifactRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM artifacts WHERE job_id = ?1 AND format = ?2")?;
    let mut rows = stmt.query_map(params![job_id, format], ArtifactRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Removes the report and artifact rows of a job.
pub fn delete_for_job(conn: &Connection, job_id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM artifacts WHERE job_id = ?1", params![job_id])?;
    conn.execute("DELETE FROM reports WHERE job_id = ?1", params![job_id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, mode, config, created_at, updated_at)
                 VALUES ('j1', 'document', '{}', 't', 't')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn sample_report(markdown: &str) -> ReportRow {
        ReportRow {
            job_id: "j1".to_string(),
            content_html: format!("<p>{}</p>", markdown),
            content_markdown: markdown.to_string(),
            references_json: "[]".to_string(),
            search_results_raw: "[]".to_string(),
            reasoning: "Style: analytical".to_string(),
            export_failures: "[]".to_string(),
            created_at: "t".to_string(),
        }
    }

    #[test]
    fn test_upsert_replaces_report() {
        let db = seeded_db();
        db.with_conn(|conn| {
            upsert(conn, &sample_report("first"))?;
            upsert(conn, &sample_report("second"))?;
            let report = find(conn, "j1")?.unwrap();
            assert_eq!(report.content_markdown, "second");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_artifacts_and_delete() {
        let db = seeded_db();
        db.with_conn(|conn| {
            upsert(conn, &sample_report("body"))?;
            for format in ["pdf", "txt"] {
                insert_artifact(
                    conn,
                    &ArtifactRow {
                        job_id: "j1".to_string(),
                        format: format.to_string(),
                        storage_path: format!("/data/artifacts/j1/report.{}", format),
                        size_bytes: 10,
                        mime_type: "application/octet-stream".to_string(),
                        created_at: "t".to_string(),
                    },
                )?;
            }
            assert_eq!(list_artifacts(conn, "j1")?.len(), 2);
            assert!(find_artifact(conn, "j1", "pdf")?.is_some());
            assert!(find_artifact(conn, "j1", "docx")?.is_none());

            delete_for_job(conn, "j1")?;
            assert!(find(conn, "j1")?.is_none());
            assert!(list_artifacts(conn, "j1")?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
