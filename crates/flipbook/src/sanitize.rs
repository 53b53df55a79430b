//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Storage roots and upload paths can reveal user names and directory
//! layouts; spans only ever carry a file name or an opaque hash.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a path for correlation without
/// exposing the actual path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{:016x}", hash)
}

/// Shortens a SHA-256 content hash for log lines.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/storage/flipbook_sources/brochure.pdf")),
            "brochure.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_hash_path_deterministic() {
        let path = Path::new("flipbook_sources/brochure.pdf");
        assert_eq!(hash_path(path), hash_path(path));
        assert_eq!(hash_path(path).len(), 16);
        assert_ne!(hash_path(path), hash_path(Path::new("flipbook_sources/other.pdf")));
    }

    #[test]
    fn test_short_hash() {
        let hash = "a".repeat(64);
        assert_eq!(short_hash(&hash), "aaaaaaaaaaaa");
        assert_eq!(short_hash("abc"), "abc");
    }
}
