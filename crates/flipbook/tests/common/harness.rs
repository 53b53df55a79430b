//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct owns a temp directory with a storage root and a
//! work directory, an in-memory document store and a local file storage.
//! Pipelines are built per test with whatever converter backends the test
//! needs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use flipbook::converter::{ConverterBackend, ConverterChain};
use flipbook::db::{Database, DocumentStore, SqliteDocumentStore};
use flipbook::document::{Document, DocumentId};
use flipbook::pipeline::{Pipeline, PipelineConfig};
use flipbook::processor::OptimizerSettings;
use flipbook::storage::{FileStorage, LocalFileStorage};

pub const SOURCES_FOLDER: &str = "flipbook_sources";
pub const PUBLIC_BASE_URL: &str = "/fileadmin";

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage_root: PathBuf,
    pub work_dir: PathBuf,
    pub store: Arc<dyn DocumentStore>,
    pub storage: Arc<LocalFileStorage>,
    pub config: PipelineConfig,
}

impl TestHarness {
    /// Create a harness with thumbnails enabled and optipng disabled, so
    /// optimization always takes the re-encode path.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let storage_root = base.join("storage");
        let work_dir = base.join("work");
        std::fs::create_dir_all(&storage_root).expect("Failed to create storage dir");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");

        let database = Database::open_in_memory().expect("Failed to open database");
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(database));
        let storage = Arc::new(LocalFileStorage::new(&storage_root, PUBLIC_BASE_URL));

        let config = PipelineConfig {
            work_directory: work_dir.clone(),
            optimizer: OptimizerSettings {
                optipng_path: Some(base.join("no-optipng")),
                ..OptimizerSettings::default()
            },
            ..PipelineConfig::default()
        };

        Self {
            temp_dir,
            storage_root,
            work_dir,
            store,
            storage,
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Build a pipeline over the harness state with the given backends.
    pub fn pipeline(&self, backends: Vec<Box<dyn ConverterBackend>>) -> Pipeline {
        let storage: Arc<dyn FileStorage> = self.storage.clone();
        Pipeline::new(
            Arc::new(self.config.clone()),
            Arc::clone(&self.store),
            storage,
            ConverterChain::new(backends, 150),
        )
    }

    /// Upload bytes into the sources folder, returning the identifier.
    pub fn upload(&self, filename: &str, content: &[u8]) -> String {
        let local = self.temp_dir.path().join(format!("upload_{}", filename));
        std::fs::write(&local, content).expect("Failed to write upload");
        let stored = self
            .storage
            .store(&local, SOURCES_FOLDER, filename)
            .expect("Failed to store upload");
        std::fs::remove_file(&local).expect("Failed to remove upload");
        stored.identifier
    }

    /// Place a sparse file of `size` bytes in the sources folder without
    /// copying it.
    pub fn upload_sparse(&self, filename: &str, size: u64) -> String {
        let dir = self.storage_root.join(SOURCES_FOLDER);
        std::fs::create_dir_all(&dir).expect("Failed to create sources dir");
        let file = std::fs::File::create(dir.join(filename)).expect("Failed to create file");
        file.set_len(size).expect("Failed to size file");
        format!("{}/{}", SOURCES_FOLDER, filename)
    }

    /// Save a pending document pointing at `source`.
    pub fn create_document(&self, title: &str, source: Option<String>) -> Document {
        let mut doc = Document::new(title, source);
        self.store.save(&mut doc).expect("Failed to save document");
        doc
    }

    /// Upload a PDF and save a document for it.
    pub fn create_pdf_document(&self, title: &str, pdf: &[u8]) -> Document {
        let source = self.upload(&format!("{}.pdf", title.replace(' ', "_")), pdf);
        self.create_document(title, Some(source))
    }

    pub fn reload(&self, id: DocumentId) -> Document {
        self.store
            .find_by_id(id)
            .expect("Failed to load document")
            .expect("Document missing")
    }

    pub fn exists(&self, identifier: &str) -> bool {
        self.storage.exists(identifier)
    }

    /// Number of entries left in the work directory.
    pub fn work_dir_entries(&self) -> usize {
        std::fs::read_dir(&self.work_dir)
            .map(|rd| rd.count())
            .unwrap_or(0)
    }
}
