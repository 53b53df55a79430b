//! Backend discovery through PATH with shell-script stand-ins for the real
//! tools. These tests mutate process-wide PATH and run serially.

#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serial_test::serial;

use common::{pdf_bytes, write_png, TestHarness};
use flipbook::converter::{BackendKind, ConverterChain, ConverterSettings};
use flipbook::document::DocumentStatus;
use flipbook::pipeline::{Pipeline, ProcessingOutcome};
use flipbook::storage::FileStorage;

/// Restores PATH when dropped.
struct PathGuard(Option<std::ffi::OsString>);

impl PathGuard {
    fn prepend(dir: &Path) -> Self {
        let original = std::env::var_os("PATH");
        let mut paths = vec![dir.to_path_buf()];
        if let Some(existing) = &original {
            paths.extend(std::env::split_paths(existing));
        }
        std::env::set_var("PATH", std::env::join_paths(paths).unwrap());
        Self(original)
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        match self.0.take() {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A `gs` stand-in that copies `sample` to every page of the
/// `-sOutputFile` pattern.
fn fake_ghostscript(dir: &Path, sample: &Path, pages: usize) -> PathBuf {
    let body = format!(
        r#"for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) out="${{arg#-sOutputFile=}}" ;;
  esac
done
n=1
while [ $n -le {pages} ]; do
  /bin/cp "{sample}" "$(printf "$out" $n)"
  n=$((n + 1))
done
"#,
        pages = pages,
        sample = sample.display()
    );
    write_script(dir, "gs", &body)
}

fn path_pipeline(harness: &TestHarness, settings: ConverterSettings) -> Pipeline {
    let mut config = harness.config.clone();
    config.converter = settings.clone();
    let storage: Arc<dyn FileStorage> = harness.storage.clone();
    Pipeline::new(
        Arc::new(config),
        Arc::clone(&harness.store),
        storage,
        ConverterChain::from_settings(&settings),
    )
}

#[test]
#[serial]
fn test_ghostscript_found_on_path_after_missing_imagemagick() {
    let harness = TestHarness::new();
    let bin = harness.temp_path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let sample = harness.temp_path().join("sample.png");
    write_png(&sample, 300, 400);
    fake_ghostscript(&bin, &sample, 2);

    let _path = PathGuard::prepend(&bin);

    let settings = ConverterSettings {
        imagemagick_path: Some(harness.temp_path().join("no-such-convert")),
        ..ConverterSettings::default()
    };
    let pipeline = path_pipeline(&harness, settings);
    let mut doc = harness.create_pdf_document("Scripted", &pdf_bytes(2, "scripted"));

    let outcome = pipeline.process_document(&mut doc).unwrap();
    assert!(matches!(
        outcome,
        ProcessingOutcome::Converted { ref backend, pages: 2, .. } if backend == "ghostscript"
    ));

    let stored = harness.reload(doc.id.unwrap());
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!((stored.pages[0].width, stored.pages[0].height), (300, 400));
    assert!(stored
        .processing_log
        .contains("Conversion with imagemagick failed: executable not found"));
}

#[test]
#[serial]
fn test_failing_tool_on_path_reports_stderr() {
    let harness = TestHarness::new();
    let bin = harness.temp_path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_script(&bin, "pdftoppm", "echo 'Syntax Error: broken xref' >&2\nexit 1\n");

    let _path = PathGuard::prepend(&bin);

    let settings = ConverterSettings {
        backends: vec![BackendKind::Pdftoppm],
        ..ConverterSettings::default()
    };
    let pipeline = path_pipeline(&harness, settings);
    let mut doc = harness.create_pdf_document("Corrupt", &pdf_bytes(1, "corrupt"));

    pipeline.process_document(&mut doc).unwrap_err();

    let stored = harness.reload(doc.id.unwrap());
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored.processing_log.contains("broken xref"));
    assert!(stored.pages.is_empty());
}
