use std::path::PathBuf;

use thiserror::Error;

use crate::document::DocumentId;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Document must be saved before it can be processed")]
    NotPersisted,

    #[error("Document {0} is already being processed")]
    AlreadyProcessing(DocumentId),

    #[error("Source file not found: {0}")]
    NoSourceFile(String),

    #[error(transparent)]
    Validation(#[from] crate::error::ValidationError),

    #[error("Failed to hash '{path}': {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Conversion(#[from] crate::error::ConversionError),

    #[error("Storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Failed to create work directory in '{path}': {source}")]
    WorkDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl PipelineError {
    /// Errors raised before the document was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineError::NotPersisted | PipelineError::AlreadyProcessing(_))
    }
}
