//! Domain model: documents, their page manifest, processing log and
//! flipbook display settings.

pub mod flipbook_config;
pub mod log;
pub mod model;

pub use flipbook_config::{FlipbookConfig, FlipbookOverrides};
pub use log::{LogEntry, ProcessingLog};
pub use model::{Document, DocumentId, DocumentStatus, Page, Thumbnail};
