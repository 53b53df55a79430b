use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::command::{locate_executable, run_converter};
use super::{collect_pages, ConverterBackend};
use crate::error::ConversionError;

const NAME: &str = "pdftoppm";

/// Rasterizes with poppler's `pdftoppm`. Not part of the default chain.
///
/// pdftoppm pads page numbers to the width of the page count
/// (`page-1.png` or `page-01.png`); [`collect_pages`] accepts either.
pub struct PdftoppmBackend {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl PdftoppmBackend {
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    fn executable(&self) -> Option<PathBuf> {
        locate_executable(self.binary.as_deref(), &[NAME])
    }
}

impl ConverterBackend for PdftoppmBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    fn convert(&self, pdf: &Path, output_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>, ConversionError> {
        let executable = self.executable().ok_or_else(|| ConversionError::NotAvailable {
            backend: NAME.to_string(),
            reason: "pdftoppm not found".to_string(),
        })?;

        let mut command = Command::new(&executable);
        command
            .args(["-png", "-r"])
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(output_dir.join("page"));

        run_converter(NAME, command, self.timeout)?;
        collect_pages(NAME, output_dir)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_collects_padded_output() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("pdftoppm");
        std::fs::write(
            &tool,
            "#!/bin/sh\nfor last; do :; done\ntouch \"$last-01.png\" \"$last-02.png\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let backend = PdftoppmBackend::new(Some(tool), Duration::from_secs(10));
        let pages = backend.convert(Path::new("/tmp/doc.pdf"), &out, 150).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].ends_with("page-01.png"));
    }
}
