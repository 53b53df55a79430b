//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub mod document_repo;
pub mod error;
pub mod migrations;
pub mod store;

pub use error::DatabaseError;
pub use store::SqliteDocumentStore;

use crate::document::{Document, DocumentId, DocumentStatus};

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled for file-backed
/// databases.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Returns the canonical database path: `~/.flipbook/data/flipbook.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".flipbook").join("data").join("flipbook.db"))
}

/// Document counts and aggregates for operators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStatistics {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub error: u64,
    pub total_file_size: u64,
    /// Mean over documents that recorded a processing time.
    pub average_processing_time_ms: Option<f64>,
}

impl DocumentStatistics {
    pub fn count(&self, status: DocumentStatus) -> u64 {
        match status {
            DocumentStatus::Pending => self.pending,
            DocumentStatus::Processing => self.processing,
            DocumentStatus::Completed => self.completed,
            DocumentStatus::Error => self.error,
        }
    }
}

/// Durable document persistence used by the pipeline.
pub trait DocumentStore: Send + Sync {
    fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, DatabaseError>;

    /// A Completed document with this content hash, other than `exclude`.
    fn find_by_content_hash(
        &self,
        hash: &str,
        exclude: Option<DocumentId>,
    ) -> Result<Option<Document>, DatabaseError>;

    /// Inserts a new document and assigns its id.
    fn save(&self, document: &mut Document) -> Result<DocumentId, DatabaseError>;

    /// Writes every field of an existing document; last writer wins.
    fn update(&self, document: &mut Document) -> Result<(), DatabaseError>;

    /// Atomically moves the document to Processing unless it already is.
    /// Returns `false` if another caller holds the claim.
    fn claim_for_processing(&self, id: DocumentId) -> Result<bool, DatabaseError>;

    fn delete(&self, id: DocumentId) -> Result<bool, DatabaseError>;

    fn find_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>, DatabaseError>;

    fn find_all(&self) -> Result<Vec<Document>, DatabaseError>;

    /// Documents in one of `statuses` not updated since `older_than`.
    fn find_stale(
        &self,
        statuses: &[DocumentStatus],
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Document>, DatabaseError>;

    /// Whether a manifest other than `excluding`'s references the file.
    fn is_file_referenced(
        &self,
        identifier: &str,
        excluding: Option<DocumentId>,
    ) -> Result<bool, DatabaseError>;

    fn statistics(&self) -> Result<DocumentStatistics, DatabaseError>;

    fn bulk_update_status(
        &self,
        ids: &[DocumentId],
        status: DocumentStatus,
    ) -> Result<usize, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with("flipbook.db"));
        assert!(path.to_string_lossy().contains(".flipbook"));
    }

    #[test]
    fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (title, created_at, updated_at) VALUES ('t', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db2.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_statistics_count_by_status() {
        let stats = DocumentStatistics {
            completed: 4,
            error: 1,
            ..Default::default()
        };
        assert_eq!(stats.count(DocumentStatus::Completed), 4);
        assert_eq!(stats.count(DocumentStatus::Error), 1);
        assert_eq!(stats.count(DocumentStatus::Pending), 0);
    }
}
