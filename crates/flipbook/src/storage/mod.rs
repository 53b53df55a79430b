pub mod filesystem;

use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub use filesystem::LocalFileStorage;

/// A file persisted in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Stable, storage-relative identifier (`folder/name.png`).
    pub identifier: String,
    pub public_url: String,
    pub size: u64,
}

/// Blob storage for uploaded sources, rendered pages and thumbnails.
///
/// Identifiers are opaque to callers; only the storage maps them onto
/// actual locations.
pub trait FileStorage: Send + Sync {
    /// Copies `local_path` into `folder` under `filename`. An existing file
    /// with the same name is never overwritten; a numbered variant is used.
    fn store(&self, local_path: &Path, folder: &str, filename: &str) -> Result<StoredFile, StorageError>;

    /// Removes the file. Returns `false` if it did not exist.
    fn delete(&self, identifier: &str) -> Result<bool, StorageError>;

    fn exists(&self, identifier: &str) -> bool;

    /// Local path of a stored file, if it exists.
    fn resolve(&self, identifier: &str) -> Option<PathBuf>;

    fn public_url(&self, identifier: &str) -> String;
}
