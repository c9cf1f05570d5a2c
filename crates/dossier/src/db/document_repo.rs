//! Source documents attached to a job.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub job_id: String,
    pub position: u32,
    pub original_filename: String,
    pub declared_type: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub extracted_text: Option<String>,
    pub extraction_method: Option<String>,
    /// JSON-encoded extraction metadata.
    pub extraction_metadata: Option<String>,
    pub created_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            position: row.get("position")?,
            original_filename: row.get("original_filename")?,
            declared_type: row.get("declared_type")?,
            storage_path: row.get("storage_path")?,
            size_bytes: row.get("size_bytes")?,
            extracted_text: row.get("extracted_text")?,
            extraction_method: row.get("extraction_method")?,
            extraction_metadata: row.get("extraction_metadata")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(conn: &Connection, doc: &DocumentRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, job_id, position, original_filename, declared_type,
         storage_path, size_bytes, extracted_text, extraction_method, extraction_metadata,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            doc.id,
            doc.job_id,
            doc.position,
            doc.original_filename,
            doc.declared_type,
            doc.storage_path,
            doc.size_bytes,
            doc.extracted_text,
            doc.extraction_method,
            doc.extraction_metadata,
            doc.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<DocumentRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM documents WHERE job_id = ?1 ORDER BY position")?;
    let rows = stmt
        .query_map(params![job_id], DocumentRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stores extraction output. The text is written once: a document that
/// already has text is left untouched and `false` is returned.
pub fn record_extraction(
    conn: &Connection,
    id: &str,
    text: &str,
    method: &str,
    metadata: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents SET extracted_text = ?2, extraction_method = ?3, extraction_metadata = ?4
         WHERE id = ?1 AND extracted_text IS NULL",
        params![id, text, method, metadata],
    )?;
    Ok(changed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{job_repo, Database};

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, mode, config, created_at, updated_at)
                 VALUES ('j1', 'multi_document', '{}', 't', 't')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn sample_doc(id: &str, position: u32) -> DocumentRow {
        DocumentRow {
            id: id.to_string(),
            job_id: "j1".to_string(),
            position,
            original_filename: format!("{}.pdf", id),
            declared_type: "application/pdf".to_string(),
            storage_path: format!("/data/uploads/j1/{}.pdf", id),
            size_bytes: 1024,
            extracted_text: None,
            extraction_method: None,
            extraction_metadata: None,
            created_at: "t".to_string(),
        }
    }

    #[test]
    fn test_list_ordered_by_position() {
        let db = seeded_db();
        db.with_conn(|conn| {
            insert(conn, &sample_doc("b", 1))?;
            insert(conn, &sample_doc("a", 0))?;
            let docs = list_for_job(conn, "j1")?;
            assert_eq!(docs.len(), 2);
            assert_eq!(docs[0].id, "a");
            assert_eq!(docs[1].id, "b");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_extracted_text_written_once() {
        let db = seeded_db();
        db.with_conn(|conn| {
            insert(conn, &sample_doc("a", 0))?;
            assert!(record_extraction(conn, "a", "first", "fast_pdf", "{}")?);
            assert!(!record_extraction(conn, "a", "second", "plaintext", "{}")?);
            let docs = list_for_job(conn, "j1")?;
            assert_eq!(docs[0].extracted_text.as_deref(), Some("first"));
            assert_eq!(docs[0].extraction_method.as_deref(), Some("fast_pdf"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_documents_require_existing_job() {
        let db = seeded_db();
        let result = db.with_conn(|conn| {
            let mut doc = sample_doc("x", 0);
            doc.job_id = "missing".to_string();
            insert(conn, &doc)
        });
        assert!(result.is_err());
        db.with_conn(|conn| {
            assert!(job_repo::find_by_id(conn, "missing")?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
