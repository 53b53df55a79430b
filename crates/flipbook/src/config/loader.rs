use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Config file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` are YAML; everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let mut config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Upper bound for `processing.stale_after_secs` (ten years).
pub const MAX_STALE_AFTER_SECS: u64 = 10 * 365 * 86_400;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Validate version
    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1");
    }

    if config.validation.max_file_size == 0 {
        return invalid("validation.max_file_size must be greater than 0");
    }

    let converter = &config.converter;
    if !(36..=1200).contains(&converter.dpi) {
        return invalid(format!(
            "converter.dpi must be between 36 and 1200, got {}",
            converter.dpi
        ));
    }
    if converter.backends.is_empty() {
        return invalid("converter.backends must name at least one backend");
    }
    let mut seen = HashSet::new();
    for backend in &converter.backends {
        if !seen.insert(backend) {
            return invalid(format!(
                "converter.backends lists '{}' more than once",
                backend.as_str()
            ));
        }
    }
    if converter.timeout_secs == 0 {
        return invalid("converter.timeout_secs must be greater than 0");
    }

    let optimizer = &config.optimizer;
    if optimizer.thumbnail_width == 0 || optimizer.thumbnail_height == 0 {
        return invalid("optimizer thumbnail dimensions must be greater than 0");
    }
    if optimizer.optipng_level > 7 {
        return invalid(format!(
            "optimizer.optipng_level must be between 0 and 7, got {}",
            optimizer.optipng_level
        ));
    }

    let stale_after = config.processing.stale_after_secs;
    if stale_after == 0 || stale_after > MAX_STALE_AFTER_SECS {
        return invalid(format!(
            "processing.stale_after_secs must be between 1 and {}, got {}",
            MAX_STALE_AFTER_SECS, stale_after
        ));
    }

    if config.storage.processed_folder.trim_matches('/').is_empty() {
        return invalid("storage.processed_folder must not be empty");
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Validation {
        message: message.into(),
    })
}

fn expand_paths(config: &mut Config) {
    for path in [
        config.database_path.as_mut(),
        config.work_directory.as_mut(),
        Some(&mut config.storage.root),
    ]
    .into_iter()
    .flatten()
    {
        *path = expand_home(path);
    }
}

/// Replaces a leading `~` with the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
