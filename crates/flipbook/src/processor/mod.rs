//! Per-file processing steps that do not depend on a converter backend:
//! validation, content hashing, PDF inspection and image optimization.

pub mod hasher;
pub mod optimizer;
pub mod pdf;
pub mod validator;

pub use hasher::{hash_file, ContentHasher, Sha256Hasher};
pub use optimizer::{ImageOptimizer, OptimizeMethod, OptimizeOutcome, OptimizerSettings, ThumbnailImage};
pub use validator::{FileValidator, ValidatedFile, DEFAULT_MAX_FILE_SIZE};
