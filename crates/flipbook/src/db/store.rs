//! SQLite-backed [`DocumentStore`].

use chrono::{DateTime, SecondsFormat, Utc};

use super::document_repo::{self, DocumentRow};
use super::{Database, DatabaseError, DocumentStatistics, DocumentStore};
use crate::document::{Document, DocumentId, DocumentStatus, FlipbookOverrides, Page, ProcessingLog};

#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Database,
}

impl SqliteDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Fixed-width UTC timestamps so that text comparison in SQL matches
/// chronological order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidData {
            column,
            value: value.to_string(),
        })
}

fn to_json<T: serde::Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|source| DatabaseError::Serialization { column, source })
}

fn from_json<T: serde::de::DeserializeOwned>(column: &'static str, value: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(value).map_err(|source| DatabaseError::Serialization { column, source })
}

fn to_row(document: &Document) -> Result<DocumentRow, DatabaseError> {
    Ok(DocumentRow {
        id: document.id.map(|id| id.0).unwrap_or_default(),
        title: document.title.clone(),
        description: document.description.clone(),
        source_file: document.source_file.clone(),
        status: document.status.as_str().to_string(),
        content_hash: document.content_hash.clone(),
        file_size: document.file_size as i64,
        total_pages: i64::from(document.total_pages),
        processing_time_ms: document.processing_time_ms as i64,
        last_processed: document.last_processed.as_ref().map(format_timestamp),
        processing_log: to_json("processing_log", &document.processing_log)?,
        processed_images: to_json("processed_images", &document.pages)?,
        flipbook_config: to_json("flipbook_config", &document.flipbook_config)?,
        created_at: format_timestamp(&document.created_at),
        updated_at: format_timestamp(&document.updated_at),
    })
}

fn from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    let status: DocumentStatus = row.status.parse().map_err(|_| DatabaseError::InvalidData {
        column: "status",
        value: row.status.clone(),
    })?;

    let last_processed = row
        .last_processed
        .as_deref()
        .map(|v| parse_timestamp("last_processed", v))
        .transpose()?;

    let pages: Vec<Page> = from_json("processed_images", &row.processed_images)?;
    let processing_log: ProcessingLog = from_json("processing_log", &row.processing_log)?;
    let flipbook_config: FlipbookOverrides = from_json("flipbook_config", &row.flipbook_config)?;

    Ok(Document {
        id: Some(DocumentId(row.id)),
        title: row.title,
        description: row.description,
        source_file: row.source_file,
        status,
        content_hash: row.content_hash,
        file_size: u64::try_from(row.file_size).unwrap_or(0),
        total_pages: u32::try_from(row.total_pages).unwrap_or(0),
        processing_time_ms: u64::try_from(row.processing_time_ms).unwrap_or(0),
        last_processed,
        processing_log,
        pages,
        flipbook_config,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
    })
}

fn from_rows(rows: Vec<DocumentRow>) -> Result<Vec<Document>, DatabaseError> {
    rows.into_iter().map(from_row).collect()
}

impl DocumentStore for SqliteDocumentStore {
    fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, DatabaseError> {
        document_repo::find_by_id(&self.db, id.0)?
            .map(from_row)
            .transpose()
    }

    fn find_by_content_hash(
        &self,
        hash: &str,
        exclude: Option<DocumentId>,
    ) -> Result<Option<Document>, DatabaseError> {
        document_repo::find_completed_by_hash(&self.db, hash, exclude.map(|id| id.0))?
            .map(from_row)
            .transpose()
    }

    fn save(&self, document: &mut Document) -> Result<DocumentId, DatabaseError> {
        let now = Utc::now();
        document.created_at = now;
        document.updated_at = now;
        let id = DocumentId(document_repo::insert(&self.db, &to_row(document)?)?);
        document.id = Some(id);
        log::debug!("Saved document {}", id);
        Ok(id)
    }

    fn update(&self, document: &mut Document) -> Result<(), DatabaseError> {
        let id = document.id.ok_or(DatabaseError::NotPersisted)?;
        document.updated_at = Utc::now();
        if document_repo::update(&self.db, &to_row(document)?)? {
            Ok(())
        } else {
            Err(DatabaseError::NotFound(id.0))
        }
    }

    fn claim_for_processing(&self, id: DocumentId) -> Result<bool, DatabaseError> {
        document_repo::claim(&self.db, id.0, &format_timestamp(&Utc::now()))
    }

    fn delete(&self, id: DocumentId) -> Result<bool, DatabaseError> {
        document_repo::delete(&self.db, id.0)
    }

    fn find_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>, DatabaseError> {
        from_rows(document_repo::find_by_status(&self.db, status.as_str())?)
    }

    fn find_all(&self) -> Result<Vec<Document>, DatabaseError> {
        from_rows(document_repo::find_all(&self.db)?)
    }

    fn find_stale(
        &self,
        statuses: &[DocumentStatus],
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Document>, DatabaseError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        from_rows(document_repo::find_stale(
            &self.db,
            &statuses,
            &format_timestamp(&older_than),
        )?)
    }

    fn is_file_referenced(
        &self,
        identifier: &str,
        excluding: Option<DocumentId>,
    ) -> Result<bool, DatabaseError> {
        document_repo::is_file_referenced(&self.db, identifier, excluding.map(|id| id.0))
    }

    fn statistics(&self) -> Result<DocumentStatistics, DatabaseError> {
        let row = document_repo::statistics(&self.db)?;
        Ok(DocumentStatistics {
            total: row.total,
            pending: row.pending,
            processing: row.processing,
            completed: row.completed,
            error: row.error,
            total_file_size: row.total_file_size,
            average_processing_time_ms: row.average_processing_time_ms,
        })
    }

    fn bulk_update_status(
        &self,
        ids: &[DocumentId],
        status: DocumentStatus,
    ) -> Result<usize, DatabaseError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        document_repo::bulk_update_status(
            &self.db,
            &ids,
            status.as_str(),
            &format_timestamp(&Utc::now()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Thumbnail;

    fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(Database::open_in_memory().unwrap())
    }

    fn page(n: u32) -> Page {
        Page {
            page: n,
            identifier: format!("flipbook_processed/doc/page_{:04}.png", n),
            public_url: format!("/fileadmin/flipbook_processed/doc/page_{:04}.png", n),
            width: 1240,
            height: 1754,
            file_size: 2048,
            thumbnail: Some(Thumbnail {
                identifier: format!("flipbook_processed/doc/thumb_page_{:04}.png", n),
                public_url: format!("/fileadmin/flipbook_processed/doc/thumb_page_{:04}.png", n),
                width: 141,
                height: 200,
            }),
        }
    }

    #[test]
    fn test_save_assigns_id_and_round_trips() {
        let store = store();
        let mut doc = Document::new("Brochure", Some("flipbook_sources/brochure.pdf".into()))
            .with_description("Spring edition");
        doc.processing_log.append("Started processing PDF document");
        doc.pages = vec![page(1), page(2)];
        doc.total_pages = 2;
        doc.status = DocumentStatus::Completed;
        doc.content_hash = Some("deadbeef".into());
        doc.last_processed = Some(Utc::now());
        doc.flipbook_config.set("autoplay", true);

        let id = store.save(&mut doc).unwrap();
        assert_eq!(doc.id, Some(id));

        let loaded = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.title, "Brochure");
        assert_eq!(loaded.description, "Spring edition");
        assert_eq!(loaded.pages, doc.pages);
        assert_eq!(loaded.processing_log.len(), 1);
        assert_eq!(loaded.flipbook_config, doc.flipbook_config);
        assert_eq!(loaded.status, DocumentStatus::Completed);
        assert_eq!(
            loaded.last_processed.map(|t| t.timestamp_micros()),
            doc.last_processed.map(|t| t.timestamp_micros())
        );
    }

    #[test]
    fn test_update_requires_saved_document() {
        let store = store();
        let mut doc = Document::new("Unsaved", None);
        assert!(matches!(store.update(&mut doc), Err(DatabaseError::NotPersisted)));

        doc.id = Some(DocumentId(42));
        assert!(matches!(store.update(&mut doc), Err(DatabaseError::NotFound(42))));
    }

    #[test]
    fn test_update_bumps_updated_at() {
        let store = store();
        let mut doc = Document::new("Doc", None);
        store.save(&mut doc).unwrap();
        let before = doc.updated_at;

        doc.status = DocumentStatus::Error;
        store.update(&mut doc).unwrap();
        assert!(doc.updated_at >= before);

        let loaded = store.find_by_id(doc.id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Error);
    }

    #[test]
    fn test_content_hash_lookup_only_matches_completed() {
        let store = store();
        let mut done = Document::new("Done", None);
        done.content_hash = Some("same".into());
        done.status = DocumentStatus::Completed;
        store.save(&mut done).unwrap();

        let mut fresh = Document::new("Fresh", None);
        fresh.content_hash = Some("same".into());
        store.save(&mut fresh).unwrap();

        let found = store.find_by_content_hash("same", fresh.id).unwrap().unwrap();
        assert_eq!(found.id, done.id);
        assert!(store.find_by_content_hash("same", done.id).unwrap().is_none());
    }

    #[test]
    fn test_find_stale_uses_updated_at() {
        let store = store();
        let mut stuck = Document::new("Stuck", None);
        stuck.status = DocumentStatus::Processing;
        store.save(&mut stuck).unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let stale = store
            .find_stale(&[DocumentStatus::Processing], cutoff)
            .unwrap();
        assert_eq!(stale.len(), 1);

        let earlier = Utc::now() - chrono::Duration::hours(1);
        assert!(store
            .find_stale(&[DocumentStatus::Processing], earlier)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_file_reference_check() {
        let store = store();
        let mut a = Document::new("A", None);
        a.pages = vec![page(1)];
        a.total_pages = 1;
        store.save(&mut a).unwrap();

        let mut b = Document::new("B", None);
        b.pages = vec![page(1)];
        store.save(&mut b).unwrap();

        let image = page(1).identifier;
        assert!(store.is_file_referenced(&image, a.id).unwrap());

        b.clear_manifest();
        store.update(&mut b).unwrap();
        assert!(!store.is_file_referenced(&image, a.id).unwrap());
    }

    #[test]
    fn test_bulk_update_and_statistics() {
        let store = store();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut doc = Document::new(format!("Doc {}", i), None);
            ids.push(store.save(&mut doc).unwrap());
        }

        assert_eq!(store.bulk_update_status(&ids[..2], DocumentStatus::Error).unwrap(), 2);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.error, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(store.find_by_status(DocumentStatus::Error).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let store = store();
        let mut doc = Document::new("Doc", None);
        let id = store.save(&mut doc).unwrap();
        store
            .database()
            .with_conn(|conn| {
                conn.execute("UPDATE documents SET status = 'exploded' WHERE id = ?1", [id.0])?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            store.find_by_id(id),
            Err(DatabaseError::InvalidData { column: "status", .. })
        ));
    }
}
