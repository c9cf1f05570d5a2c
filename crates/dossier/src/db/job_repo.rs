//! Job repository: the `jobs` and `job_events` tables.
//!
//! Functions take a `&Connection` so the job store can compose them inside
//! one transaction (`Transaction` derefs to `Connection`).

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub mode: String,
    /// JSON-encoded job configuration.
    pub config: String,
    pub status: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub processing_log: String,
    pub attempts: u32,
    pub elapsed_ms: Option<i64>,
    /// JSON array of non-fatal warnings from the last attempt.
    pub warnings: String,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            mode: row.get("mode")?,
            config: row.get("config")?,
            status: row.get("status")?,
            error_kind: row.get("error_kind")?,
            error_message: row.get("error_message")?,
            processing_log: row.get("processing_log")?,
            attempts: row.get("attempts")?,
            elapsed_ms: row.get("elapsed_ms")?,
            warnings: row.get("warnings")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub job_id: String,
    pub status: String,
    pub message: String,
    pub at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            status: row.get("status")?,
            message: row.get("message")?,
            at: row.get("at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub mode: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, mode, config, status, error_kind, error_message, processing_log,
         attempts, elapsed_ms, warnings, created_at, updated_at, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            job.id,
            job.mode,
            job.config,
            job.status,
            job.error_kind,
            job.error_message,
            job.processing_log,
            job.attempts,
            job.elapsed_ms,
            job.warnings,
            job.created_at,
            job.updated_at,
            job.started_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Moves a job from `from` to `to` only if it is still in `from`.
/// Returns whether the row changed.
pub fn transition(
    conn: &Connection,
    id: &str,
    from: &str,
    to: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id, from, to, now],
    )?;
    Ok(changed == 1)
}

/// Records the start of an attempt: bumps the attempt counter and clears
/// the previous attempt's timing and warnings.
pub fn mark_started(conn: &Connection, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET started_at = ?2, updated_at = ?2, completed_at = NULL, elapsed_ms = NULL,
         warnings = '[]', attempts = attempts + 1
         WHERE id = ?1 AND status = 'pending'",
        params![id, now],
    )?;
    Ok(changed == 1)
}

pub fn mark_completed(
    conn: &Connection,
    id: &str,
    elapsed_ms: i64,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', elapsed_ms = ?2, completed_at = ?3, updated_at = ?3,
         error_kind = NULL, error_message = NULL
         WHERE id = ?1 AND status = 'generating'",
        params![id, elapsed_ms, now],
    )?;
    Ok(changed == 1)
}

pub fn mark_failed(
    conn: &Connection,
    id: &str,
    from: &str,
    error_kind: &str,
    error_message: &str,
    elapsed_ms: Option<i64>,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'error', error_kind = ?3, error_message = ?4, elapsed_ms = ?5,
         updated_at = ?6
         WHERE id = ?1 AND status = ?2",
        params![id, from, error_kind, error_message, elapsed_ms, now],
    )?;
    Ok(changed == 1)
}

/// `error → pending`, optionally replacing the configuration.
pub fn reset_for_retry(
    conn: &Connection,
    id: &str,
    config: Option<&str>,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'pending', error_kind = NULL, error_message = NULL,
         completed_at = NULL, elapsed_ms = NULL, warnings = '[]',
         config = COALESCE(?2, config), updated_at = ?3
         WHERE id = ?1 AND status = 'error'",
        params![id, config, now],
    )?;
    Ok(changed == 1)
}

pub fn append_log(
    conn: &Connection,
    id: &str,
    line: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET processing_log = processing_log || ?2, updated_at = ?3 WHERE id = ?1",
        params![id, line, now],
    )?;
    Ok(())
}

pub fn set_warnings(conn: &Connection, id: &str, warnings: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET warnings = ?2 WHERE id = ?1",
        params![id, warnings],
    )?;
    Ok(())
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }
    if let Some(ref mode) = filter.mode {
        conditions.push(format!("mode = ?{}", param_values.len() + 1));
        param_values.push(Box::new(mode.clone()));
    }
    if let Some(ref from_date) = filter.from_date {
        conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(from_date.clone()));
    }
    if let Some(ref to_date) = filter.to_date {
        conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
        param_values.push(Box::new(to_date.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT * FROM jobs {} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<JobRow> = stmt
        .query_map(params_ref.as_slice(), JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Ids of every job in `status`, oldest first.
pub fn ids_with_status(conn: &Connection, status: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id FROM jobs WHERE status = ?1 ORDER BY created_at, id")?;
    let ids = stmt
        .query_map(params![status], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}

pub fn insert_event(
    conn: &Connection,
    job_id: &str,
    status: &str,
    message: &str,
    at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_events (job_id, status, message, at) VALUES (?1, ?2, ?3, ?4)",
        params![job_id, status, message, at],
    )?;
    Ok(())
}

pub fn list_events(conn: &Connection, job_id: &str) -> Result<Vec<EventRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM job_events WHERE job_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![job_id], EventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
