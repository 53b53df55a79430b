use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::command::{locate_executable, run_converter};
use super::{collect_pages, ConverterBackend};
use crate::error::ConversionError;

const NAME: &str = "imagemagick";
const CANDIDATES: &[&str] = &["convert", "magick"];

/// Rasterizes with ImageMagick (`convert -density <dpi> in.pdf out/page-%04d.png`).
pub struct ImageMagickBackend {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl ImageMagickBackend {
    /// `binary` overrides the `PATH` lookup of `convert`/`magick`.
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    fn executable(&self) -> Option<PathBuf> {
        locate_executable(self.binary.as_deref(), CANDIDATES)
    }
}

impl ConverterBackend for ImageMagickBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    fn convert(&self, pdf: &Path, output_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>, ConversionError> {
        let executable = self.executable().ok_or_else(|| ConversionError::NotAvailable {
            backend: NAME.to_string(),
            reason: "neither convert nor magick found".to_string(),
        })?;

        let mut command = Command::new(&executable);
        command
            .arg("-density")
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(output_dir.join("page-%04d.png"));

        tracing::debug!("Running {} for {}", executable.display(), pdf.display());

        run_converter(NAME, command, self.timeout)?;
        collect_pages(NAME, output_dir)
    }
}
