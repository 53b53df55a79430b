use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::converter::BackendKind;
use crate::document::FlipbookConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file. Defaults to `~/.flipbook/data/flipbook.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Parent of per-run scratch directories. Defaults to the system temp dir.
    #[serde(default)]
    pub work_directory: Option<PathBuf>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub flipbook: FlipbookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            work_directory: None,
            worker_count: default_worker_count(),
            storage: StorageConfig::default(),
            validation: ValidationConfig::default(),
            converter: ConverterConfig::default(),
            optimizer: OptimizerConfig::default(),
            processing: ProcessingConfig::default(),
            flipbook: FlipbookConfig::default(),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Prefix of every public URL handed out for stored files.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_processed_folder")]
    pub processed_folder: String,
    /// Folder that `add` copies uploaded PDFs into.
    #[serde(default = "default_sources_folder")]
    pub sources_folder: String,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_public_base_url() -> String {
    "/fileadmin".to_string()
}

fn default_processed_folder() -> String {
    "flipbook_processed".to_string()
}

fn default_sources_folder() -> String {
    "flipbook_sources".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
            processed_folder: default_processed_folder(),
            sources_folder: default_sources_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    crate::processor::DEFAULT_MAX_FILE_SIZE
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Tried in order until one produces pages.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,
    #[serde(default)]
    pub imagemagick_path: Option<PathBuf>,
    #[serde(default)]
    pub ghostscript_path: Option<PathBuf>,
    #[serde(default)]
    pub pdftoppm_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_dpi() -> u32 {
    crate::converter::DEFAULT_DPI
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::ImageMagick, BackendKind::Ghostscript]
}

fn default_timeout_secs() -> u64 {
    crate::converter::DEFAULT_TIMEOUT.as_secs()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            backends: default_backends(),
            imagemagick_path: None,
            ghostscript_path: None,
            pdftoppm_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_height: u32,
    #[serde(default)]
    pub optipng_path: Option<PathBuf>,
    #[serde(default = "default_optipng_level")]
    pub optipng_level: u8,
}

fn default_thumbnail_size() -> u32 {
    crate::processor::optimizer::DEFAULT_THUMBNAIL_SIZE
}

fn default_optipng_level() -> u8 {
    crate::processor::optimizer::DEFAULT_OPTIPNG_LEVEL
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thumbnail_width: default_thumbnail_size(),
            thumbnail_height: default_thumbnail_size(),
            optipng_path: None,
            optipng_level: default_optipng_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Keep only the newest N entries of each processing log.
    #[serde(default)]
    pub max_log_entries: Option<usize>,
    /// Processing documents untouched for this long are considered stuck.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    crate::pipeline::DEFAULT_STALE_AFTER.as_secs()
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_log_entries: None,
            stale_after_secs: default_stale_after_secs(),
        }
    }
}
