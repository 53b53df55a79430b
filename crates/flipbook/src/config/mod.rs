pub mod loader;
pub mod schema;

pub use loader::{
    load_config, load_config_from_str, validate_config, ConfigFormat, MAX_STALE_AFTER_SECS,
};
pub use schema::{
    Config, ConverterConfig, OptimizerConfig, ProcessingConfig, StorageConfig, ValidationConfig,
};
