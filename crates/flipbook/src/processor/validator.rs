use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// Upper size bound used when none is configured (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

const PDF_SIGNATURE: &[u8] = b"%PDF";
const PDF_MIME: &str = "application/pdf";

/// A source file that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Checks that a file is a non-empty, size-bounded PDF.
///
/// Only reads the first few bytes of the file. Checks run in a fixed order
/// so the first failing rule is the one reported.
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl FileValidator {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn validate(&self, path: &Path) -> Result<ValidatedFile, ValidationError> {
        let _span = tracing::debug_span!("validator.validate").entered();

        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(ValidationError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ValidationError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(ValidationError::Unreadable {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let size = metadata.len();
        if size == 0 {
            return Err(ValidationError::Empty {
                path: path.to_path_buf(),
            });
        }

        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        let has_signature = read_signature(path)?;
        if !has_signature {
            return Err(ValidationError::BadSignature {
                path: path.to_path_buf(),
            });
        }

        let detected = detect_mime(path, has_signature);
        if detected != PDF_MIME {
            return Err(ValidationError::WrongMimeType { detected });
        }

        Ok(ValidatedFile {
            path: path.to_path_buf(),
            size,
        })
    }
}

fn read_signature(path: &Path) -> Result<bool, ValidationError> {
    let unreadable = |e| ValidationError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(unreadable)?;
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..]).map_err(unreadable)?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled == header.len() && header == PDF_SIGNATURE)
}

/// MIME type from the extension; files without one are judged by their
/// signature.
fn detect_mime(path: &Path, has_signature: bool) -> String {
    if path.extension().is_none() {
        return if has_signature {
            PDF_MIME.to_string()
        } else {
            "application/octet-stream".to_string()
        };
    }

    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn pdf_file(contents: &[u8], suffix: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_valid_pdf() {
        let file = pdf_file(b"%PDF-1.5\n%%EOF\n", ".pdf");
        let validated = FileValidator::default().validate(file.path()).unwrap();
        assert_eq!(validated.size, 15);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FileValidator::default()
            .validate(&dir.path().join("nope.pdf"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotFound { .. }));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let err = FileValidator::default().validate(dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::NotFound { .. }));
    }

    #[test]
    fn test_empty_file() {
        let file = pdf_file(b"", ".pdf");
        let err = FileValidator::default().validate(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_too_large_checked_before_signature() {
        let file = pdf_file(b"not a pdf but big enough", ".pdf");
        let err = FileValidator::new(10).validate(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { size: 24, max: 10 }));
    }

    #[test]
    fn test_size_equal_to_max_is_accepted() {
        let file = pdf_file(b"%PDF-1.4", ".pdf");
        assert!(FileValidator::new(8).validate(file.path()).is_ok());
    }

    #[test]
    fn test_bad_signature() {
        let file = pdf_file(b"PK\x03\x04zipdata", ".pdf");
        let err = FileValidator::default().validate(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::BadSignature { .. }));
    }

    #[test]
    fn test_short_file_has_no_signature() {
        let file = pdf_file(b"%P", ".pdf");
        let err = FileValidator::default().validate(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::BadSignature { .. }));
    }

    #[test]
    fn test_wrong_extension_mime() {
        let file = pdf_file(b"%PDF-1.5 disguised", ".txt");
        let err = FileValidator::default().validate(file.path()).unwrap_err();
        match err {
            ValidationError::WrongMimeType { detected } => assert_eq!(detected, "text/plain"),
            other => panic!("Expected WrongMimeType, got {other:?}"),
        }
    }

    #[test]
    fn test_no_extension_uses_signature() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert!(FileValidator::default().validate(&path).is_ok());
    }
}
