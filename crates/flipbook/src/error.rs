use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlipbookError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Why a source file was rejected before conversion.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("PDF file does not exist: {path}")]
    NotFound { path: PathBuf },

    #[error("PDF file is empty (empty file): {path}")]
    Empty { path: PathBuf },

    #[error("PDF file too large: {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("File does not have a valid PDF signature: {path}")]
    BadSignature { path: PathBuf },

    #[error("File is not a valid PDF (detected MIME type: {detected})")]
    WrongMimeType { detected: String },

    #[error("Failed to read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One converter backend's failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub backend: String,
    pub message: String,
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("{backend} is not available: {reason}")]
    NotAvailable { backend: String, reason: String },

    #[error("{backend} failed: {message}")]
    Failed { backend: String, message: String },

    #[error("{backend} timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    #[error("{backend} produced no pages")]
    NoPagesProduced { backend: String },

    #[error("All converter backends failed: {}", join_failures(.attempts))]
    AllBackendsFailed { attempts: Vec<BackendFailure> },

    #[error("Converter I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_failures(attempts: &[BackendFailure]) -> String {
    if attempts.is_empty() {
        return "no backends configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConversionError {
    /// Name of the backend this error originated from, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            ConversionError::NotAvailable { backend, .. }
            | ConversionError::Failed { backend, .. }
            | ConversionError::Timeout { backend, .. }
            | ConversionError::NoPagesProduced { backend } => Some(backend),
            ConversionError::AllBackendsFailed { .. } | ConversionError::Io { .. } => None,
        }
    }
}

/// Thumbnail and optimization failures. Never fatal to a document.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Failed to decode image '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Failed to encode image '{path}': {message}")]
    Encode { path: PathBuf, message: String },

    #[error("optipng failed on '{path}': {message}")]
    Tool { path: PathBuf, message: String },

    #[error("Image I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete '{identifier}': {source}")]
    DeleteFile {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage identifier: {0}")]
    InvalidIdentifier(String),

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job failed: {0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, FlipbookError>;
