//! Row-level operations for the `documents` table.
//!
//! Rows carry JSON and timestamps as text; conversion to the domain model
//! happens in [`super::store`].

use rusqlite::{params, params_from_iter, Row};

use super::{Database, DatabaseError};

/// A raw document row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub source_file: Option<String>,
    pub status: String,
    pub content_hash: Option<String>,
    pub file_size: i64,
    pub total_pages: i64,
    pub processing_time_ms: i64,
    pub last_processed: Option<String>,
    pub processing_log: String,
    pub processed_images: String,
    pub flipbook_config: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            source_file: row.get("source_file")?,
            status: row.get("status")?,
            content_hash: row.get("content_hash")?,
            file_size: row.get("file_size")?,
            total_pages: row.get("total_pages")?,
            processing_time_ms: row.get("processing_time_ms")?,
            last_processed: row.get("last_processed")?,
            processing_log: row.get("processing_log")?,
            processed_images: row.get("processed_images")?,
            flipbook_config: row.get("flipbook_config")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Aggregate numbers over all documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsRow {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub error: u64,
    pub total_file_size: u64,
    pub average_processing_time_ms: Option<f64>,
}

/// Inserts a new row and returns its id. `row.id` is ignored.
pub fn insert(db: &Database, row: &DocumentRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (title, description, source_file, status, content_hash,
             file_size, total_pages, processing_time_ms, last_processed, processing_log,
             processed_images, flipbook_config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.title,
                row.description,
                row.source_file,
                row.status,
                row.content_hash,
                row.file_size,
                row.total_pages,
                row.processing_time_ms,
                row.last_processed,
                row.processing_log,
                row.processed_images,
                row.flipbook_config,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Overwrites every column except `id` and `created_at`. Returns whether
/// the row existed.
pub fn update(db: &Database, row: &DocumentRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET title=?2, description=?3, source_file=?4, status=?5,
             content_hash=?6, file_size=?7, total_pages=?8, processing_time_ms=?9,
             last_processed=?10, processing_log=?11, processed_images=?12,
             flipbook_config=?13, updated_at=?14
             WHERE id=?1",
            params![
                row.id,
                row.title,
                row.description,
                row.source_file,
                row.status,
                row.content_hash,
                row.file_size,
                row.total_pages,
                row.processing_time_ms,
                row.last_processed,
                row.processing_log,
                row.processed_images,
                row.flipbook_config,
                row.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Oldest completed document with the given content hash, other than
/// `exclude`.
pub fn find_completed_by_hash(
    db: &Database,
    hash: &str,
    exclude: Option<i64>,
) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM documents
             WHERE content_hash = ?1 AND status = 'completed' AND (?2 IS NULL OR id != ?2)
             ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![hash, exclude], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Sets status to `processing` unless it already is. Returns whether this
/// call won the claim.
pub fn claim(db: &Database, id: i64, updated_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = 'processing', updated_at = ?2
             WHERE id = ?1 AND status != 'processing'",
            params![id, updated_at],
        )?;
        Ok(changed == 1)
    })
}

pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

pub fn find_by_status(db: &Database, status: &str) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE status = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![status], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn find_all(db: &Database) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Documents in one of `statuses` whose last update is before `older_than`.
pub fn find_stale(
    db: &Database,
    statuses: &[&str],
    older_than: &str,
) -> Result<Vec<DocumentRow>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT * FROM documents WHERE updated_at < ?1 AND status IN ({}) ORDER BY id ASC",
            placeholders.join(", ")
        );

        let mut values: Vec<&str> = Vec::with_capacity(statuses.len() + 1);
        values.push(older_than);
        values.extend_from_slice(statuses);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Whether any document other than `excluding` lists `identifier` as a
/// page image or thumbnail in its manifest.
pub fn is_file_referenced(
    db: &Database,
    identifier: &str,
    excluding: Option<i64>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let referenced: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM documents d, json_each(d.processed_images) p
                WHERE (?2 IS NULL OR d.id != ?2)
                  AND (json_extract(p.value, '$.identifier') = ?1
                       OR json_extract(p.value, '$.thumbnail.identifier') = ?1)
             )",
            params![identifier, excluding],
            |r| r.get(0),
        )?;
        Ok(referenced)
    })
}

pub fn statistics(db: &Database) -> Result<StatisticsRow, DatabaseError> {
    db.with_conn(|conn| {
        let mut stats = StatisticsRow::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
        let counts = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (status, count) in counts {
            stats.total += count;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "error" => stats.error = count,
                other => log::warn!("Unknown document status in statistics: {}", other),
            }
        }

        stats.total_file_size =
            conn.query_row("SELECT COALESCE(SUM(file_size), 0) FROM documents", [], |r| {
                r.get(0)
            })?;
        stats.average_processing_time_ms = conn.query_row(
            "SELECT AVG(processing_time_ms) FROM documents WHERE processing_time_ms > 0",
            [],
            |r| r.get(0),
        )?;

        Ok(stats)
    })
}

/// Sets the status of several documents at once. Returns the number of
/// rows changed.
pub fn bulk_update_status(
    db: &Database,
    ids: &[i64],
    status: &str,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    if ids.is_empty() {
        return Ok(0);
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (0..ids.len()).map(|i| format!("?{}", i + 3)).collect();
        let sql = format!(
            "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::with_capacity(ids.len() + 2);
        values.push(Box::new(status.to_string()));
        values.push(Box::new(updated_at.to_string()));
        for id in ids {
            values.push(Box::new(*id));
        }
        let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let changed = conn.execute(&sql, params_ref.as_slice())?;
        Ok(changed)
    })
}
