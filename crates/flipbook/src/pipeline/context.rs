use std::path::PathBuf;
use std::time::Instant;

use tempfile::TempDir;

use crate::document::Page;

/// State of a single processing attempt.
pub struct PipelineContext {
    pub started: Instant,
    pub dedup_enabled: bool,

    // Manifest of a previous run, moved aside when the attempt starts
    pub superseded: Vec<Page>,

    // Local path of the source PDF, set once the source is resolved
    pub source_path: Option<PathBuf>,

    // Scratch directory, removed when the context is dropped
    pub work_dir: Option<TempDir>,

    // Converter output, ordered as pages 1..N
    pub rendered: Vec<PathBuf>,
    pub backend: Option<String>,

    // Storage folder holding this attempt's pages
    pub storage_folder: Option<String>,

    // Every identifier stored during this attempt, for rollback
    pub stored: Vec<String>,
}

impl PipelineContext {
    pub fn new(dedup_enabled: bool) -> Self {
        Self {
            started: Instant::now(),
            dedup_enabled,
            superseded: Vec::new(),
            source_path: None,
            work_dir: None,
            rendered: Vec::new(),
            backend: None,
            storage_folder: None,
            stored: Vec::new(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
