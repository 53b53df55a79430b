use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::converter::ConverterChain;
use crate::db::DocumentStore;
use crate::document::{Document, DocumentId, DocumentStatus, Page, Thumbnail};
use crate::processor::{self, ContentHasher, FileValidator, ImageOptimizer, Sha256Hasher};
use crate::sanitize;
use crate::storage::FileStorage;
use crate::worker::{DocumentJob, JobMode, WorkerPool};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;

/// How a successful run reached Completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Converted {
        backend: String,
        pages: u32,
        elapsed_ms: u64,
    },
    /// Manifest copied from a completed document with the same content.
    Deduplicated {
        source: DocumentId,
        pages: u32,
        elapsed_ms: u64,
    },
}

impl ProcessingOutcome {
    pub fn pages(&self) -> u32 {
        match self {
            ProcessingOutcome::Converted { pages, .. }
            | ProcessingOutcome::Deduplicated { pages, .. } => *pages,
        }
    }
}

/// What happened to a document's generated files during cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    /// Already gone from storage.
    pub missing: usize,
    /// Still referenced by another document's manifest.
    pub shared: usize,
    pub failed: usize,
}

/// Result of a batch run over pending documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn FileStorage>,
    validator: FileValidator,
    hasher: Box<dyn ContentHasher>,
    converter: ConverterChain,
    optimizer: ImageOptimizer,
}

impl Pipeline {
    /// Builds the converter chain from config.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        let converter = ConverterChain::from_settings(&config.converter);
        Self::new(config, store, storage, converter)
    }

    /// Constructor with an explicit converter chain.
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn FileStorage>,
        converter: ConverterChain,
    ) -> Self {
        let validator = FileValidator::new(config.max_file_size);
        let optimizer = ImageOptimizer::new(config.optimizer.clone());
        Self {
            config,
            store,
            storage,
            validator,
            hasher: Box::new(Sha256Hasher),
            converter,
            optimizer,
        }
    }

    /// Replaces the SHA-256 content hasher.
    pub fn with_hasher(mut self, hasher: Box<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    /// Converts a saved document into a page manifest.
    ///
    /// `Ok` means the document ended Completed. Every other outcome leaves
    /// it in Error with the reason in its processing log, except
    /// [`PipelineError::NotPersisted`] and [`PipelineError::AlreadyProcessing`],
    /// which do not touch the document at all.
    pub fn process_document(&self, doc: &mut Document) -> Result<ProcessingOutcome, PipelineError> {
        let id = doc.id.ok_or(PipelineError::NotPersisted)?;
        self.claim(id)?;
        self.run_claimed(doc, id, true)
    }

    /// Discards the current manifest and log and converts again. Never
    /// reuses another document's pages.
    pub fn reprocess_document(&self, doc: &mut Document) -> Result<ProcessingOutcome, PipelineError> {
        let id = doc.id.ok_or(PipelineError::NotPersisted)?;
        self.claim(id)?;

        let report = self.remove_generated_files(doc, id);
        debug!("Reprocess cleanup for document {}: {:?}", id, report);

        doc.processing_log.clear();
        doc.processing_log.append("Reprocessing started");
        self.run_claimed(doc, id, false)
    }

    /// Deletes page and thumbnail files, empties the manifest and resets the
    /// document to Pending. Files shared with other documents are kept.
    pub fn delete_processed_images(&self, doc: &mut Document) -> Result<CleanupReport, PipelineError> {
        let id = doc.id.ok_or(PipelineError::NotPersisted)?;
        self.ensure_not_processing(id)?;

        let report = self.remove_generated_files(doc, id);
        doc.status = DocumentStatus::Pending;
        self.persist(doc)?;

        info!(
            "Deleted processed images for document {}: {} deleted, {} shared, {} missing",
            id, report.deleted, report.shared, report.missing
        );
        Ok(report)
    }

    /// Removes the document record together with its generated files.
    pub fn delete_document(&self, doc: &mut Document) -> Result<CleanupReport, PipelineError> {
        let id = doc.id.ok_or(PipelineError::NotPersisted)?;
        self.ensure_not_processing(id)?;

        let report = self.remove_generated_files(doc, id);
        self.store.delete(id)?;
        doc.id = None;

        info!("Deleted document {}", id);
        Ok(report)
    }

    /// Moves documents stuck in Processing for longer than `max_age`
    /// (default: the configured stale age) to Error.
    pub fn recover_stale(&self, max_age: Option<Duration>) -> Result<Vec<DocumentId>, PipelineError> {
        let max_age = max_age.unwrap_or(self.config.stale_after);
        let cutoff = stale_cutoff(Utc::now(), max_age);

        let stale = self
            .store
            .find_stale(&[DocumentStatus::Processing], cutoff)?;

        let mut recovered = Vec::with_capacity(stale.len());
        for mut doc in stale {
            let Some(id) = doc.id else { continue };

            let report = self.remove_generated_files(&mut doc, id);
            doc.status = DocumentStatus::Error;
            doc.processing_log.append(format!(
                "Error: processing did not finish within {}s; marked as failed",
                max_age.as_secs()
            ));
            self.persist(&mut doc)?;

            warn!(
                "Recovered stale document {} ({} files removed)",
                id, report.deleted
            );
            recovered.push(id);
        }

        Ok(recovered)
    }

    /// Runs every Pending document through a worker pool.
    pub fn process_pending(self: &Arc<Self>, worker_count: usize) -> Result<BatchReport, PipelineError> {
        let pending = self.store.find_by_status(DocumentStatus::Pending)?;
        let mut report = BatchReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let pool = WorkerPool::new(Arc::clone(self), worker_count);
        let ids: Vec<DocumentId> = pending.iter().filter_map(|d| d.id).collect();

        let mut outstanding = 0usize;
        for id in ids {
            // Drain results while submitting so the bounded channels never stall.
            while let Some(result) = pool.try_recv_result() {
                outstanding -= 1;
                record_result(&mut report, result.success);
            }
            match pool.submit(DocumentJob::new(id, JobMode::Process)) {
                Ok(()) => {
                    report.submitted += 1;
                    outstanding += 1;
                }
                Err(e) => {
                    warn!("Failed to submit document {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        while outstanding > 0 {
            match pool.recv_result() {
                Some(result) => {
                    outstanding -= 1;
                    record_result(&mut report, result.success);
                }
                None => break,
            }
        }

        pool.shutdown();
        pool.wait();

        info!(
            "Batch finished: {} submitted, {} succeeded, {} failed",
            report.submitted, report.succeeded, report.failed
        );
        Ok(report)
    }

    fn claim(&self, id: DocumentId) -> Result<(), PipelineError> {
        if self.store.claim_for_processing(id)? {
            Ok(())
        } else {
            debug!("Document {} is already being processed", id);
            Err(PipelineError::AlreadyProcessing(id))
        }
    }

    fn ensure_not_processing(&self, id: DocumentId) -> Result<(), PipelineError> {
        match self.store.find_by_id(id)? {
            Some(stored) if stored.status == DocumentStatus::Processing => {
                Err(PipelineError::AlreadyProcessing(id))
            }
            _ => Ok(()),
        }
    }

    /// Runs the attempt for a document this caller has claimed.
    fn run_claimed(
        &self,
        doc: &mut Document,
        id: DocumentId,
        dedup_enabled: bool,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let source = doc.source_file.as_deref().map(Path::new);
        let filename = source
            .map(sanitize::redact_path)
            .unwrap_or_else(|| "<none>".to_string());
        let source_ref = source.map(sanitize::hash_path).unwrap_or_default();
        let _pipeline_span = info_span!("pipeline",
            document_id = %id,
            filename = %filename,
            source_ref = %source_ref,
            dedup = dedup_enabled,
        )
        .entered();

        let mut ctx = PipelineContext::new(dedup_enabled);

        // Step 1: Enter Processing
        doc.status = DocumentStatus::Processing;
        doc.processing_log.append("Started processing PDF document");
        ctx.superseded = std::mem::take(&mut doc.pages);
        doc.total_pages = 0;

        let result = self
            .persist(doc)
            .and_then(|()| self.execute(doc, id, &mut ctx));

        let result = match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(doc, &mut ctx, e)),
        };

        self.cleanup_superseded(doc, id, &ctx);
        result
    }

    fn execute(
        &self,
        doc: &mut Document,
        id: DocumentId,
        ctx: &mut PipelineContext,
    ) -> Result<ProcessingOutcome, PipelineError> {
        // Step 2: Resolve source
        {
            let _step = info_span!("resolve_source").entered();
            self.step_resolve_source(doc, ctx)?;
        }

        // Step 3: Validate
        let size = {
            let _step = info_span!("validate").entered();
            self.step_validate(ctx)?
        };

        // Step 4: Hash
        {
            let _step = info_span!("hash").entered();
            self.step_hash(doc, ctx, size)?;
        }

        // Step 5: Dedup
        if ctx.dedup_enabled {
            let _step = info_span!("dedup").entered();
            if let Some(outcome) = self.step_dedup(doc, id, ctx)? {
                return Ok(outcome);
            }
        }

        // Step 6: Convert
        {
            let _step = info_span!("convert").entered();
            self.step_convert(doc, id, ctx)?;
        }

        // Step 7: Store pages
        {
            let _step = info_span!("store_pages").entered();
            self.step_store_pages(doc, id, ctx)?;
        }

        // Step 8: Thumbnails and optimization
        {
            let _step = info_span!("optimize").entered();
            self.step_optimize(doc, ctx);
            self.persist(doc)?;
        }

        // Step 9: Completed
        let elapsed_ms = ctx.elapsed_ms();
        self.complete(
            doc,
            elapsed_ms,
            format!("Processing completed successfully in {}ms", elapsed_ms),
        )?;

        Ok(ProcessingOutcome::Converted {
            backend: ctx.backend.clone().unwrap_or_default(),
            pages: doc.total_pages,
            elapsed_ms,
        })
    }

    fn step_resolve_source(&self, doc: &Document, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let identifier = doc
            .source_file
            .as_deref()
            .ok_or_else(|| PipelineError::NoSourceFile("no source file attached".to_string()))?;

        let path = self
            .storage
            .resolve(identifier)
            .ok_or_else(|| PipelineError::NoSourceFile(identifier.to_string()))?;

        ctx.source_path = Some(path);
        Ok(())
    }

    fn step_validate(&self, ctx: &PipelineContext) -> Result<u64, PipelineError> {
        let path = ctx
            .source_path
            .as_deref()
            .ok_or_else(|| PipelineError::NoSourceFile("source not resolved".to_string()))?;
        let validated = self.validator.validate(path)?;
        Ok(validated.size)
    }

    fn step_hash(&self, doc: &mut Document, ctx: &PipelineContext, size: u64) -> Result<(), PipelineError> {
        let path = ctx
            .source_path
            .as_deref()
            .ok_or_else(|| PipelineError::NoSourceFile("source not resolved".to_string()))?;

        let hash = self.hasher.hash(path).map_err(|source| PipelineError::Hash {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Content hash {}", sanitize::short_hash(&hash));
        doc.content_hash = Some(hash);
        doc.file_size = size;
        Ok(())
    }

    fn step_dedup(
        &self,
        doc: &mut Document,
        id: DocumentId,
        ctx: &PipelineContext,
    ) -> Result<Option<ProcessingOutcome>, PipelineError> {
        let Some(hash) = doc.content_hash.as_deref() else {
            return Ok(None);
        };
        let Some(existing) = self.store.find_by_content_hash(hash, Some(id))? else {
            return Ok(None);
        };
        let Some(source_id) = existing.id else {
            return Ok(None);
        };

        info!("Reusing pages of document {} with identical content", source_id);
        doc.processing_log
            .append("Found existing processed document - using existing processed data");

        doc.pages = existing.pages;
        doc.total_pages = existing.total_pages;
        doc.flipbook_config = existing.flipbook_config;

        let elapsed_ms = ctx.elapsed_ms();
        self.complete(doc, elapsed_ms, "Processing completed using existing data".to_string())?;

        Ok(Some(ProcessingOutcome::Deduplicated {
            source: source_id,
            pages: doc.total_pages,
            elapsed_ms,
        }))
    }

    fn step_convert(
        &self,
        doc: &mut Document,
        id: DocumentId,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        let source = ctx
            .source_path
            .clone()
            .ok_or_else(|| PipelineError::NoSourceFile("source not resolved".to_string()))?;

        let work_dir = tempfile::Builder::new()
            .prefix(&format!("flipbook_{}_", id))
            .tempdir_in(&self.config.work_directory)
            .map_err(|source| PipelineError::WorkDirectory {
                path: self.config.work_directory.clone(),
                source,
            })?;
        let output_dir = work_dir.path().join("pages");
        ctx.work_dir = Some(work_dir);

        let expected_pages = match processor::pdf::page_count(&source) {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Could not count pages of {}: {}", sanitize::redact_path(&source), e);
                None
            }
        };

        let output = self.converter.convert(&source, &output_dir)?;

        for failure in &output.failures {
            doc.processing_log.append(format!(
                "Conversion with {} failed: {}; trying next backend",
                failure.backend, failure.message
            ));
        }
        doc.processing_log.append(format!(
            "Converted {} pages using {}",
            output.pages.len(),
            output.backend
        ));

        if let Some(expected) = expected_pages {
            if expected != output.pages.len() {
                warn!(
                    "PDF declares {} pages but {} produced {}",
                    expected,
                    output.backend,
                    output.pages.len()
                );
            }
        }

        ctx.backend = Some(output.backend);
        ctx.rendered = output.pages;
        Ok(())
    }

    fn step_store_pages(
        &self,
        doc: &mut Document,
        id: DocumentId,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let folder = format!(
            "{}/document_{}_{}_{}",
            self.config.processed_folder.trim_end_matches('/'),
            id,
            Utc::now().format("%Y%m%d%H%M%S"),
            &run_id[..8]
        );
        ctx.storage_folder = Some(folder.clone());

        let mut pages = Vec::with_capacity(ctx.rendered.len());
        for (index, rendered) in ctx.rendered.iter().enumerate() {
            let number = index as u32 + 1;

            let (width, height) = match image::image_dimensions(rendered) {
                Ok(dims) => dims,
                Err(e) => {
                    warn!("Could not read dimensions of page {}: {}", number, e);
                    doc.processing_log
                        .append(format!("Could not read dimensions of page {}: {}", number, e));
                    (0, 0)
                }
            };

            let stored = self
                .storage
                .store(rendered, &folder, &format!("page_{:04}.png", number))?;
            ctx.stored.push(stored.identifier.clone());

            pages.push(Page {
                page: number,
                identifier: stored.identifier,
                public_url: stored.public_url,
                width,
                height,
                file_size: stored.size,
                thumbnail: None,
            });
        }

        doc.total_pages = pages.len() as u32;
        doc.pages = pages;
        self.persist(doc)
    }

    /// Thumbnails and optimization. Failures are logged per page and never
    /// abort the run.
    fn step_optimize(&self, doc: &mut Document, ctx: &mut PipelineContext) {
        if !self.optimizer.is_enabled() {
            return;
        }
        let (Some(folder), Some(work_dir)) = (ctx.storage_folder.clone(), ctx.work_dir.as_ref()) else {
            return;
        };
        let thumb_dir = work_dir.path().join("thumbnails");
        if let Err(e) = std::fs::create_dir_all(&thumb_dir) {
            warn!("Could not create thumbnail directory: {}", e);
            doc.processing_log
                .append(format!("Thumbnail generation skipped: {}", e));
            return;
        }

        let mut log_lines = Vec::new();
        for page in doc.pages.iter_mut() {
            let Some(local) = self.storage.resolve(&page.identifier) else {
                log_lines.push(format!(
                    "Optimization skipped for page {}: stored file not accessible",
                    page.page
                ));
                continue;
            };

            match self.optimizer.create_thumbnail(&local, &thumb_dir) {
                Ok(thumb) => {
                    let filename = thumb
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("thumb_page_{:04}.png", page.page));
                    match self.storage.store(&thumb.path, &folder, &filename) {
                        Ok(stored) => {
                            ctx.stored.push(stored.identifier.clone());
                            page.thumbnail = Some(Thumbnail {
                                identifier: stored.identifier,
                                public_url: stored.public_url,
                                width: thumb.width,
                                height: thumb.height,
                            });
                        }
                        Err(e) => log_lines.push(format!(
                            "Thumbnail generation failed for page {}: {}",
                            page.page, e
                        )),
                    }
                }
                Err(e) => {
                    warn!("Thumbnail generation failed for page {}: {}", page.page, e);
                    log_lines.push(format!(
                        "Thumbnail generation failed for page {}: {}",
                        page.page, e
                    ));
                }
            }

            match self.optimizer.optimize(&local) {
                Ok(outcome) => {
                    debug!(
                        "Page {} optimized ({:?}): {} -> {} bytes",
                        page.page, outcome.method, outcome.size_before, outcome.size_after
                    );
                    page.file_size = outcome.size_after;
                }
                Err(e) => {
                    warn!("Optimization failed for page {}: {}", page.page, e);
                    log_lines.push(format!("Optimization failed for page {}: {}", page.page, e));
                }
            }
        }

        for line in log_lines {
            doc.processing_log.append(line);
        }
    }

    fn complete(&self, doc: &mut Document, elapsed_ms: u64, message: String) -> Result<(), PipelineError> {
        doc.status = DocumentStatus::Completed;
        doc.processing_time_ms = elapsed_ms;
        doc.last_processed = Some(Utc::now());
        info!("{}", message);
        doc.processing_log.append(message);
        self.persist(doc)
    }

    /// Records the failure on the document and rolls back this attempt's
    /// files. Returns the error for the caller.
    fn fail(&self, doc: &mut Document, ctx: &mut PipelineContext, err: PipelineError) -> PipelineError {
        warn!("Processing failed: {}", err);

        doc.status = DocumentStatus::Error;
        doc.processing_log.append(format!("Error: {}", err));
        doc.clear_manifest();

        for identifier in ctx.stored.drain(..) {
            if let Err(e) = self.storage.delete(&identifier) {
                warn!("Failed to remove {} after error: {}", identifier, e);
            }
        }

        if let Err(e) = self.persist(doc) {
            warn!("Failed to persist error state: {}", e);
        }
        err
    }

    /// Deletes files of the previous manifest that nothing references any
    /// more.
    fn cleanup_superseded(&self, doc: &Document, id: DocumentId, ctx: &PipelineContext) {
        if ctx.superseded.is_empty() {
            return;
        }
        let current: HashSet<String> = doc.manifest_identifiers().into_iter().collect();
        let candidates: Vec<String> = ctx
            .superseded
            .iter()
            .flat_map(|p| p.identifiers())
            .filter(|identifier| !current.contains(*identifier))
            .map(str::to_string)
            .collect();

        let report = self.delete_unreferenced(&candidates, id);
        debug!("Superseded file cleanup: {:?}", report);
    }

    /// Deletes the document's generated files and empties its manifest.
    fn remove_generated_files(&self, doc: &mut Document, id: DocumentId) -> CleanupReport {
        let identifiers = doc.manifest_identifiers();
        let report = self.delete_unreferenced(&identifiers, id);
        doc.clear_manifest();
        report
    }

    fn delete_unreferenced(&self, identifiers: &[String], owner: DocumentId) -> CleanupReport {
        let mut report = CleanupReport::default();
        for identifier in identifiers {
            match self.store.is_file_referenced(identifier, Some(owner)) {
                Ok(true) => {
                    report.shared += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Could not check references for {}: {}", identifier, e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.storage.delete(identifier) {
                Ok(true) => report.deleted += 1,
                Ok(false) => report.missing += 1,
                Err(e) => {
                    warn!("Failed to delete {}: {}", identifier, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn persist(&self, doc: &mut Document) -> Result<(), PipelineError> {
        if let Some(max) = self.config.max_log_entries {
            doc.processing_log.retain_last(max);
        }
        self.store.update(doc)?;
        Ok(())
    }
}

/// `now - max_age`, saturating at the earliest representable instant.
fn stale_cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn record_result(report: &mut BatchReport, success: bool) {
    if success {
        report.succeeded += 1;
    } else {
        report.failed += 1;
    }
}
