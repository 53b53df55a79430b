pub mod config;
pub mod converter;
pub mod db;
pub mod document;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod worker;

pub use config::{load_config, Config};
pub use converter::{BackendKind, ConverterBackend, ConverterChain};
pub use db::{Database, DocumentStore, SqliteDocumentStore};
pub use document::{Document, DocumentId, DocumentStatus, FlipbookConfig, Page, Thumbnail};
pub use error::{
    ConfigError, ConversionError, FlipbookError, Result, StorageError, ValidationError, WorkerError,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, ProcessingOutcome};
pub use storage::{FileStorage, LocalFileStorage};
