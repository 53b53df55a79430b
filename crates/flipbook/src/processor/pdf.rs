use std::path::Path;

/// Number of pages lopdf finds in the document. Used only for diagnostics:
/// the converter output is authoritative.
pub fn page_count(path: &Path) -> Result<usize, lopdf::Error> {
    let doc = lopdf::Document::load(path)?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};
    use tempfile::NamedTempFile;

    fn create_pdf(pages: usize) -> NamedTempFile {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();

        for _ in 0..pages {
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
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

        let file = NamedTempFile::with_suffix(".pdf").unwrap();
        doc.save(file.path()).unwrap();
        file
    }

    #[test]
    fn test_page_count() {
        let file = create_pdf(3);
        assert_eq!(page_count(file.path()).unwrap(), 3);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let file = NamedTempFile::with_suffix(".pdf").unwrap();
        std::fs::write(file.path(), b"%PDF-1.5 but nothing else").unwrap();
        assert!(page_count(file.path()).is_err());
    }
}
