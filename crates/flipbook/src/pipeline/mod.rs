pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use config::{PipelineConfig, DEFAULT_STALE_AFTER};
pub use context::PipelineContext;
pub use error::PipelineError;
pub use runner::{BatchReport, CleanupReport, Pipeline, ProcessingOutcome};
