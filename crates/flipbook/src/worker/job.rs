use crate::document::{DocumentId, DocumentStatus};

/// What a worker should do with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Process,
    /// Discard the existing manifest and convert again without dedup.
    Reprocess,
}

#[derive(Debug, Clone)]
pub struct DocumentJob {
    pub id: String,
    pub document_id: DocumentId,
    pub mode: JobMode,
}

impl DocumentJob {
    pub fn new(document_id: DocumentId, mode: JobMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id,
            mode,
        }
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub document_id: DocumentId,
    pub success: bool,
    /// Status the document ended in, when it could be read back.
    pub status: Option<DocumentStatus>,
    pub pages: u32,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &DocumentJob, pages: u32) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id,
            success: true,
            status: Some(DocumentStatus::Completed),
            pages,
            error: None,
        }
    }

    pub fn failure(job: &DocumentJob, status: Option<DocumentStatus>, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id,
            success: false,
            status,
            pages: 0,
            error: Some(error),
        }
    }
}
