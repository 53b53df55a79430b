use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::command::{locate_executable, run_converter};
use super::{collect_pages, ConverterBackend};
use crate::error::ConversionError;

const NAME: &str = "ghostscript";
const CANDIDATES: &[&str] = &["gs", "gswin64c", "gswin32c"];

/// Rasterizes with Ghostscript's `png16m` device.
pub struct GhostscriptBackend {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl GhostscriptBackend {
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    fn executable(&self) -> Option<PathBuf> {
        locate_executable(self.binary.as_deref(), CANDIDATES)
    }
}

impl ConverterBackend for GhostscriptBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    fn convert(&self, pdf: &Path, output_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>, ConversionError> {
        let executable = self.executable().ok_or_else(|| ConversionError::NotAvailable {
            backend: NAME.to_string(),
            reason: "gs not found".to_string(),
        })?;

        let mut output_arg = std::ffi::OsString::from("-sOutputFile=");
        output_arg.push(output_dir.join("page_%d.png"));

        let mut command = Command::new(&executable);
        command
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-dSAFER")
            .arg("-sDEVICE=png16m")
            .arg(format!("-r{}", dpi))
            .arg(output_arg)
            .arg(pdf);

        tracing::debug!("Running {} for {}", executable.display(), pdf.display());

        run_converter(NAME, command, self.timeout)?;
        collect_pages(NAME, output_dir)
    }
}
