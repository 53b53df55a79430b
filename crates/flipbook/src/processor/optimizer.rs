//! Thumbnails and lossless PNG optimization for rendered pages.
//!
//! Nothing here is fatal to a document: callers log the error and keep the
//! page as it is.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::converter::command::{locate_executable, run_with_timeout, RunError};
use crate::error::OptimizeError;

pub const DEFAULT_THUMBNAIL_SIZE: u32 = 200;
pub const DEFAULT_OPTIPNG_LEVEL: u8 = 2;

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub optipng_path: Option<PathBuf>,
    pub optipng_level: u8,
    pub timeout: Duration,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            thumbnail_width: DEFAULT_THUMBNAIL_SIZE,
            thumbnail_height: DEFAULT_THUMBNAIL_SIZE,
            optipng_path: None,
            optipng_level: DEFAULT_OPTIPNG_LEVEL,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A thumbnail written next to its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeMethod {
    Optipng,
    Reencoded,
    /// Re-encoding did not produce a smaller file; the original was kept.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOutcome {
    pub method: OptimizeMethod,
    pub size_before: u64,
    pub size_after: u64,
}

pub struct ImageOptimizer {
    settings: OptimizerSettings,
}

impl ImageOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Writes `thumb_<name>.png` into `dest_dir`, fitting the image into the
    /// configured box. Aspect ratio is preserved and small images are never
    /// enlarged.
    pub fn create_thumbnail(&self, source: &Path, dest_dir: &Path) -> Result<ThumbnailImage, OptimizeError> {
        let _span = tracing::debug_span!("optimizer.thumbnail").entered();

        let img = open_image(source)?;
        let (width, height) = img.dimensions();
        let (max_w, max_h) = (self.settings.thumbnail_width, self.settings.thumbnail_height);

        let thumb = if width <= max_w && height <= max_h {
            img
        } else {
            img.resize(max_w, max_h, FilterType::Lanczos3)
        };

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page");
        let path = dest_dir.join(format!("thumb_{}.png", stem));

        thumb
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| OptimizeError::Encode {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(ThumbnailImage {
            path,
            width: thumb.width(),
            height: thumb.height(),
        })
    }

    /// Losslessly shrinks the PNG at `path` in place. Uses optipng when it
    /// can be found, otherwise re-encodes with the `image` crate.
    pub fn optimize(&self, path: &Path) -> Result<OptimizeOutcome, OptimizeError> {
        let _span = tracing::debug_span!("optimizer.optimize").entered();

        let size_before = file_size(path)?;

        if let Some(optipng) = locate_executable(self.settings.optipng_path.as_deref(), &["optipng"]) {
            match self.run_optipng(&optipng, path) {
                Ok(()) => {
                    return Ok(OptimizeOutcome {
                        method: OptimizeMethod::Optipng,
                        size_before,
                        size_after: file_size(path)?,
                    })
                }
                Err(e) => {
                    tracing::debug!("optipng failed, falling back to re-encode: {}", e);
                }
            }
        }

        reencode(path, size_before)
    }

    fn run_optipng(&self, optipng: &Path, path: &Path) -> Result<(), OptimizeError> {
        let mut command = Command::new(optipng);
        command
            .arg("-quiet")
            .arg(format!("-o{}", self.settings.optipng_level))
            .arg(path);

        let tool_err = |message: String| OptimizeError::Tool {
            path: path.to_path_buf(),
            message,
        };

        match run_with_timeout(command, self.settings.timeout) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(tool_err(output.failure_message())),
            Err(RunError::Timeout) => Err(tool_err("timed out".to_string())),
            Err(RunError::Spawn(e)) | Err(RunError::Wait(e)) => Err(tool_err(e.to_string())),
        }
    }
}

fn reencode(path: &Path, size_before: u64) -> Result<OptimizeOutcome, OptimizeError> {
    let img = open_image(path)?;

    let mut encoded = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut encoded, CompressionType::Default, PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| OptimizeError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let size_after = encoded.len() as u64;
    if size_after >= size_before {
        return Ok(OptimizeOutcome {
            method: OptimizeMethod::Unchanged,
            size_before,
            size_after: size_before,
        });
    }

    replace_file(path, &encoded)?;

    Ok(OptimizeOutcome {
        method: OptimizeMethod::Reencoded,
        size_before,
        size_after,
    })
}

/// Writes to a sibling temp file and renames it over `path`.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), OptimizeError> {
    let io_err = |source| OptimizeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        writer.write_all(bytes).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn open_image(path: &Path) -> Result<DynamicImage, OptimizeError> {
    image::open(path).map_err(|e| OptimizeError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn file_size(path: &Path) -> Result<u64, OptimizeError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| OptimizeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageEncoder, Rgb};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        img.save(path).unwrap();
    }

    /// Optimizer that never finds optipng, so the re-encode path is used.
    fn optimizer_without_optipng(dir: &Path) -> ImageOptimizer {
        ImageOptimizer::new(OptimizerSettings {
            optipng_path: Some(dir.join("no-optipng")),
            ..OptimizerSettings::default()
        })
    }

    #[test]
    fn test_thumbnail_fits_box_and_keeps_aspect() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("page_0001.png");
        write_png(&page, 800, 400);

        let thumb = optimizer_without_optipng(dir.path())
            .create_thumbnail(&page, dir.path())
            .unwrap();
        assert_eq!((thumb.width, thumb.height), (200, 100));
        assert!(thumb.path.ends_with("thumb_page_0001.png"));
        assert_eq!(image::image_dimensions(&thumb.path).unwrap(), (200, 100));
    }

    #[test]
    fn test_thumbnail_never_upscales() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("small.png");
        write_png(&page, 50, 80);

        let thumb = optimizer_without_optipng(dir.path())
            .create_thumbnail(&page, dir.path())
            .unwrap();
        assert_eq!((thumb.width, thumb.height), (50, 80));
    }

    #[test]
    fn test_thumbnail_of_garbage_fails() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("broken.png");
        std::fs::write(&page, b"definitely not a png").unwrap();

        let err = optimizer_without_optipng(dir.path())
            .create_thumbnail(&page, dir.path())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Decode { .. }));
    }

    #[test]
    fn test_reencode_never_grows_file() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("page.png");
        write_png(&page, 120, 90);
        let before = std::fs::read(&page).unwrap();

        let outcome = optimizer_without_optipng(dir.path()).optimize(&page).unwrap();
        assert!(outcome.size_after <= outcome.size_before);
        match outcome.method {
            OptimizeMethod::Unchanged => assert_eq!(std::fs::read(&page).unwrap(), before),
            OptimizeMethod::Reencoded => {
                assert_eq!(image::image_dimensions(&page).unwrap(), (120, 90))
            }
            OptimizeMethod::Optipng => panic!("optipng must not be used"),
        }
    }

    #[test]
    fn test_reencode_shrinks_uncompressed_png() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("flat.png");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(300, 300, Rgb([255, 255, 255]));
        let file = std::fs::File::create(&page).unwrap();
        PngEncoder::new_with_quality(file, CompressionType::Fast, PngFilter::NoFilter)
            .write_image(img.as_raw(), 300, 300, image::ExtendedColorType::Rgb8)
            .unwrap();

        let outcome = optimizer_without_optipng(dir.path()).optimize(&page).unwrap();
        assert!(outcome.size_after <= outcome.size_before);
        assert_eq!(image::image_dimensions(&page).unwrap(), (300, 300));
    }

    #[cfg(unix)]
    #[test]
    fn test_optipng_is_preferred_when_present() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("optipng");
        std::fs::write(&tool, "#!/bin/sh\necho \"$@\" > \"$(dirname \"$0\")/args\"\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let page = dir.path().join("page.png");
        write_png(&page, 10, 10);

        let optimizer = ImageOptimizer::new(OptimizerSettings {
            optipng_path: Some(tool),
            ..OptimizerSettings::default()
        });
        let outcome = optimizer.optimize(&page).unwrap();
        assert_eq!(outcome.method, OptimizeMethod::Optipng);

        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert!(args.starts_with("-quiet -o2 "), "got: {args}");
    }
}
