use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::converter::ConverterSettings;
use crate::document::FlipbookConfig;
use crate::processor::{OptimizerSettings, DEFAULT_MAX_FILE_SIZE};

/// Default age after which a document stuck in Processing is recovered.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of the per-run scratch directories.
    pub work_directory: PathBuf,
    /// Storage folder that receives `document_*` page folders.
    pub processed_folder: String,
    pub max_file_size: u64,
    pub converter: ConverterSettings,
    pub optimizer: OptimizerSettings,
    /// Keep only the newest N log entries per document. `None` keeps all.
    pub max_log_entries: Option<usize>,
    pub stale_after: Duration,
    pub flipbook_defaults: FlipbookConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_directory: std::env::temp_dir(),
            processed_folder: "flipbook_processed".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            converter: ConverterSettings::default(),
            optimizer: OptimizerSettings::default(),
            max_log_entries: None,
            stale_after: DEFAULT_STALE_AFTER,
            flipbook_defaults: FlipbookConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.converter.timeout_secs);
        Self {
            work_directory: config
                .work_directory
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            processed_folder: config.storage.processed_folder.clone(),
            max_file_size: config.validation.max_file_size,
            converter: ConverterSettings {
                dpi: config.converter.dpi,
                backends: config.converter.backends.clone(),
                imagemagick_path: config.converter.imagemagick_path.clone(),
                ghostscript_path: config.converter.ghostscript_path.clone(),
                pdftoppm_path: config.converter.pdftoppm_path.clone(),
                timeout,
            },
            optimizer: OptimizerSettings {
                enabled: config.optimizer.enabled,
                thumbnail_width: config.optimizer.thumbnail_width,
                thumbnail_height: config.optimizer.thumbnail_height,
                optipng_path: config.optimizer.optipng_path.clone(),
                optipng_level: config.optimizer.optipng_level,
                timeout,
            },
            max_log_entries: config.processing.max_log_entries,
            stale_after: Duration::from_secs(config.processing.stale_after_secs),
            flipbook_defaults: config.flipbook.clone(),
        }
    }
}
