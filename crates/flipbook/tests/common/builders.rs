//! Builders for test inputs and stand-in converter backends.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use lopdf::{dictionary, Object, Stream};

use flipbook::converter::{collect_pages, ConverterBackend};
use flipbook::error::ConversionError;
use flipbook::processor::ContentHasher;

/// Serializes a minimal PDF with `pages` pages. `label` ends up in every
/// content stream so different labels give different content hashes.
pub fn pdf_bytes(pages: usize, label: &str) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for i in 0..pages {
        let content = format!("BT ({} page {}) Tj ET", label, i + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("Failed to serialize PDF");
    buf
}

/// Writes a solid-colour PNG.
pub fn write_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    img.save(path).expect("Failed to write PNG");
}

/// Builder for an in-process converter backend.
pub struct FakeBackend {
    name: String,
    available: bool,
    pages: usize,
    width: u32,
    height: u32,
    failure: Option<String>,
    garbage_page: Option<usize>,
    empty_output: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// A backend that renders `pages` pages of 400x300.
    pub fn new(name: &str, pages: usize) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            pages,
            width: 400,
            height: 300,
            failure: None,
            garbage_page: None,
            empty_output: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A backend that always fails with `message`.
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(name, 0)
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn page_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Writes bytes that are not an image for the given 1-based page.
    pub fn garbage_page(mut self, page: usize) -> Self {
        self.garbage_page = Some(page);
        self
    }

    /// Reports success without returning any page.
    pub fn empty_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    /// Shared counter of `convert` invocations.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn boxed(self) -> Box<dyn ConverterBackend> {
        Box::new(self)
    }
}

impl ConverterBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn convert(&self, _pdf: &Path, output_dir: &Path, _dpi: u32) -> Result<Vec<PathBuf>, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failure {
            return Err(ConversionError::Failed {
                backend: self.name.clone(),
                message: message.clone(),
            });
        }

        if self.empty_output {
            return Ok(Vec::new());
        }

        for page in 1..=self.pages {
            let path = output_dir.join(format!("page-{:04}.png", page));
            if self.garbage_page == Some(page) {
                std::fs::write(&path, b"definitely not a png").expect("Failed to write page");
            } else {
                write_png(&path, self.width, self.height);
            }
        }

        collect_pages(&self.name, output_dir)
    }
}

/// Content hasher whose reads always fail.
pub struct UnreadableHasher;

impl ContentHasher for UnreadableHasher {
    fn hash(&self, _path: &Path) -> std::io::Result<String> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read denied",
        ))
    }
}
