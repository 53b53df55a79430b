//! PDF rasterization through external tools.
//!
//! Each backend shells out to one program. [`ConverterChain`] tries them in
//! the configured order and falls through to the next one on any failure.

pub mod command;
pub mod ghostscript;
pub mod imagemagick;
pub mod pdftoppm;

use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BackendFailure, ConversionError};
use crate::sanitize::redact_path;

pub use ghostscript::GhostscriptBackend;
pub use imagemagick::ImageMagickBackend;
pub use pdftoppm::PdftoppmBackend;

pub const DEFAULT_DPI: u32 = 150;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Rasterizes every page of a PDF into PNG files.
pub trait ConverterBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend's executable can be found.
    fn is_available(&self) -> bool;

    /// Writes one PNG per page into `output_dir` and returns them ordered
    /// as pages 1..N.
    fn convert(&self, pdf: &Path, output_dir: &Path, dpi: u32)
        -> Result<Vec<PathBuf>, ConversionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    ImageMagick,
    Ghostscript,
    Pdftoppm,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ImageMagick => "imagemagick",
            BackendKind::Ghostscript => "ghostscript",
            BackendKind::Pdftoppm => "pdftoppm",
        }
    }
}

/// Result of a successful chain run.
#[derive(Debug)]
pub struct ConversionOutput {
    /// Backend that produced the pages.
    pub backend: String,
    pub pages: Vec<PathBuf>,
    /// Backends that were tried and failed before the successful one.
    pub failures: Vec<BackendFailure>,
}

pub struct ConverterChain {
    backends: Vec<Box<dyn ConverterBackend>>,
    dpi: u32,
}

impl ConverterChain {
    pub fn new(backends: Vec<Box<dyn ConverterBackend>>, dpi: u32) -> Self {
        Self { backends, dpi }
    }

    /// Builds the real backends in the given order.
    pub fn from_settings(settings: &ConverterSettings) -> Self {
        let backends = settings
            .backends
            .iter()
            .map(|kind| -> Box<dyn ConverterBackend> {
                match kind {
                    BackendKind::ImageMagick => Box::new(ImageMagickBackend::new(
                        settings.imagemagick_path.clone(),
                        settings.timeout,
                    )),
                    BackendKind::Ghostscript => Box::new(GhostscriptBackend::new(
                        settings.ghostscript_path.clone(),
                        settings.timeout,
                    )),
                    BackendKind::Pdftoppm => Box::new(PdftoppmBackend::new(
                        settings.pdftoppm_path.clone(),
                        settings.timeout,
                    )),
                }
            })
            .collect();
        Self::new(backends, settings.dpi)
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Tries each backend in order. Every attempt starts from an empty
    /// `output_dir`.
    pub fn convert(&self, pdf: &Path, output_dir: &Path) -> Result<ConversionOutput, ConversionError> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            let _span = tracing::info_span!(
                "converter.attempt",
                backend = backend.name(),
                file = %redact_path(pdf)
            )
            .entered();

            reset_directory(output_dir)?;

            if !backend.is_available() {
                tracing::warn!("Converter backend {} is not available", backend.name());
                failures.push(BackendFailure {
                    backend: backend.name().to_string(),
                    message: "executable not found".to_string(),
                });
                continue;
            }

            match backend.convert(pdf, output_dir, self.dpi) {
                Ok(pages) if !pages.is_empty() => {
                    tracing::info!(
                        "Converted {} pages with {}",
                        pages.len(),
                        backend.name()
                    );
                    return Ok(ConversionOutput {
                        backend: backend.name().to_string(),
                        pages,
                        failures,
                    });
                }
                Ok(_) => {
                    tracing::warn!("Converter backend {} produced no pages", backend.name());
                    failures.push(BackendFailure {
                        backend: backend.name().to_string(),
                        message: "produced no pages".to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Converter backend {} failed: {}", backend.name(), e);
                    failures.push(BackendFailure {
                        backend: backend.name().to_string(),
                        message: failure_detail(&e),
                    });
                }
            }
        }

        Err(ConversionError::AllBackendsFailed { attempts: failures })
    }
}

/// Runtime converter settings, derived from the application config.
#[derive(Debug, Clone)]
pub struct ConverterSettings {
    pub dpi: u32,
    pub backends: Vec<BackendKind>,
    pub imagemagick_path: Option<PathBuf>,
    pub ghostscript_path: Option<PathBuf>,
    pub pdftoppm_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            backends: vec![BackendKind::ImageMagick, BackendKind::Ghostscript],
            imagemagick_path: None,
            ghostscript_path: None,
            pdftoppm_path: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The part of a backend error worth logging, without the backend name.
fn failure_detail(err: &ConversionError) -> String {
    match err {
        ConversionError::NotAvailable { reason, .. } => reason.clone(),
        ConversionError::Failed { message, .. } => message.clone(),
        ConversionError::Timeout { secs, .. } => format!("timed out after {}s", secs),
        ConversionError::NoPagesProduced { .. } => "produced no pages".to_string(),
        other => other.to_string(),
    }
}

fn reset_directory(dir: &Path) -> Result<(), ConversionError> {
    let io_err = |source| ConversionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(io_err)?;
    }
    std::fs::create_dir_all(dir).map_err(io_err)
}

/// Collects the PNGs a backend wrote into `output_dir`.
///
/// Accepts `page-N.png` and `page_N.png` with any zero padding. Numbers
/// must form a contiguous run starting at 0 or 1; the result is ordered
/// and represents pages 1..N.
pub fn collect_pages(backend: &str, output_dir: &Path) -> Result<Vec<PathBuf>, ConversionError> {
    let invalid = |message: String| ConversionError::Failed {
        backend: backend.to_string(),
        message,
    };
    let pattern = Pattern::new("page*.png").map_err(|e| invalid(e.to_string()))?;
    let page_number = Regex::new(r"^page[-_](\d+)\.png$").map_err(|e| invalid(e.to_string()))?;

    let entries = std::fs::read_dir(output_dir).map_err(|source| ConversionError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        let Some(number) = page_number
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        numbered.push((number, entry.path()));
    }

    if numbered.is_empty() {
        return Err(ConversionError::NoPagesProduced {
            backend: backend.to_string(),
        });
    }

    numbered.sort_by_key(|(n, _)| *n);

    let first = numbered[0].0;
    if first > 1 {
        return Err(ConversionError::Failed {
            backend: backend.to_string(),
            message: format!("page numbering starts at {}", first),
        });
    }
    for (offset, (number, _)) in numbered.iter().enumerate() {
        if *number != first + offset as u32 {
            return Err(ConversionError::Failed {
                backend: backend.to_string(),
                message: format!("missing page {} in converter output", first + offset as u32),
            });
        }
    }

    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}
