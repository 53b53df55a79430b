use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flipbook_config::{FlipbookConfig, FlipbookOverrides};
use super::log::ProcessingLog;

/// Store-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Pending,
        DocumentStatus::Processing,
        DocumentStatus::Completed,
        DocumentStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "error" => Ok(DocumentStatus::Error),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub identifier: String,
    pub public_url: String,
    pub width: u32,
    pub height: u32,
}

/// One entry of the page manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based page number.
    pub page: u32,
    pub identifier: String,
    pub public_url: String,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
}

impl Page {
    /// Storage identifiers owned by this page (image and thumbnail).
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.identifier.as_str())
            .chain(self.thumbnail.as_ref().map(|t| t.identifier.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<DocumentId>,
    pub title: String,
    pub description: String,
    /// Storage identifier of the uploaded PDF.
    pub source_file: Option<String>,
    pub status: DocumentStatus,
    pub content_hash: Option<String>,
    pub file_size: u64,
    pub total_pages: u32,
    pub processing_time_ms: u64,
    pub last_processed: Option<DateTime<Utc>>,
    pub processing_log: ProcessingLog,
    pub pages: Vec<Page>,
    pub flipbook_config: FlipbookOverrides,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, source_file: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            source_file,
            status: DocumentStatus::Pending,
            content_hash: None,
            file_size: 0,
            total_pages: 0,
            processing_time_ms: 0,
            last_processed: None,
            processing_log: ProcessingLog::new(),
            pages: Vec::new(),
            flipbook_config: FlipbookOverrides::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    /// Application defaults layered under this document's overrides.
    pub fn effective_flipbook_config(&self, defaults: &FlipbookConfig) -> FlipbookConfig {
        defaults.with_overrides(&self.flipbook_config)
    }

    /// All storage identifiers referenced by the manifest.
    pub fn manifest_identifiers(&self) -> Vec<String> {
        self.pages
            .iter()
            .flat_map(|p| p.identifiers())
            .map(str::to_string)
            .collect()
    }

    /// Drops the manifest and resets the page count.
    pub fn clear_manifest(&mut self) {
        self.pages.clear();
        self.total_pages = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, thumb: bool) -> Page {
        Page {
            page: n,
            identifier: format!("p/page_{:04}.png", n),
            public_url: format!("/files/p/page_{:04}.png", n),
            width: 100,
            height: 140,
            file_size: 10,
            thumbnail: thumb.then(|| Thumbnail {
                identifier: format!("p/thumb_page_{:04}.png", n),
                public_url: format!("/files/p/thumb_page_{:04}.png", n),
                width: 50,
                height: 70,
            }),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DocumentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("Annual report", Some("sources/report.pdf".into()));
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.id.is_none());
        assert!(doc.pages.is_empty());
        assert!(doc.processing_log.is_empty());
    }

    #[test]
    fn test_page_json_shape() {
        let json = serde_json::to_value(page(1, false)).unwrap();
        assert_eq!(json["publicUrl"], "/files/p/page_0001.png");
        assert_eq!(json["fileSize"], 10);
        assert!(json.get("thumbnail").is_none());

        let json = serde_json::to_value(page(2, true)).unwrap();
        assert_eq!(json["thumbnail"]["width"], 50);
    }

    #[test]
    fn test_manifest_identifiers_include_thumbnails() {
        let mut doc = Document::new("t", None);
        doc.pages = vec![page(1, true), page(2, false)];
        doc.total_pages = 2;

        let ids = doc.manifest_identifiers();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"p/thumb_page_0001.png".to_string()));

        doc.clear_manifest();
        assert!(doc.pages.is_empty());
        assert_eq!(doc.total_pages, 0);
    }

    #[test]
    fn test_effective_flipbook_config() {
        let mut doc = Document::new("t", None);
        doc.flipbook_config.set("width", 1200);
        let effective = doc.effective_flipbook_config(&FlipbookConfig::default());
        assert_eq!(effective.width, 1200);
        assert_eq!(effective.height, 600);
    }
}
