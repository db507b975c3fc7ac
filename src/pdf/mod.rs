//! PDF page text extraction
//!
//! Pages are numbered from 1, matching the physical page order of the file.

use crate::error::{Error, IndexStage, Result};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::path::Path;
use tracing::{debug, warn};

/// Text of one physical page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based physical page number
    pub number: usize,
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// Extract the text of every page in `path`.
///
/// Fails at the extraction stage when the file is missing or unreadable, has
/// no pages, or yields no text on any page.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>> {
    if !path.exists() {
        return Err(Error::indexing(
            IndexStage::Extraction,
            format!("PDF not found: {}", path.display()),
        ));
    }

    let doc = Document::load(path).map_err(|e| {
        Error::indexing(
            IndexStage::Extraction,
            format!("Failed to load PDF {}: {}", path.display(), e),
        )
    })?;

    if doc.is_encrypted() {
        return Err(Error::indexing(
            IndexStage::Extraction,
            format!("PDF is encrypted: {}", path.display()),
        ));
    }

    let page_ids = doc.get_pages();
    if page_ids.is_empty() {
        return Err(Error::indexing(
            IndexStage::Extraction,
            format!("PDF has no pages: {}", path.display()),
        ));
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for (index, (page_number, page_id)) in page_ids.iter().enumerate() {
        let text = page_text(&doc, *page_number, *page_id);
        pages.push(Page::new(index + 1, normalize_whitespace(&text)));
    }

    if pages.iter().all(|p| p.text.is_empty()) {
        return Err(Error::indexing(
            IndexStage::Extraction,
            format!("No text could be extracted from {}", path.display()),
        ));
    }

    debug!("Extracted {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

fn page_text(doc: &Document, page_number: u32, page_id: ObjectId) -> String {
    match doc.extract_text(&[page_number]) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => scan_text_operators(doc, page_id).unwrap_or_default(),
        Err(e) => {
            debug!("extract_text failed on page {}: {}", page_number, e);
            scan_text_operators(doc, page_id).unwrap_or_else(|e| {
                warn!("No text recovered from page {}: {}", page_number, e);
                String::new()
            })
        }
    }
}

/// Raw scan of the page content stream for text-showing operators
fn scan_text_operators(doc: &Document, page_id: ObjectId) -> Result<String> {
    let bytes = doc
        .get_page_content(page_id)
        .map_err(|e| Error::Pdf(e.to_string()))?;
    let content = Content::decode(&bytes).map_err(|e| Error::Pdf(e.to_string()))?;

    let mut text = String::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tj" | "TJ" | "'" | "\"" => {
                for operand in &operation.operands {
                    if let Some(s) = string_operand(operand) {
                        text.push_str(&s);
                    }
                }
                text.push(' ');
            }
            "Td" | "TD" | "T*" | "ET" => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }

    Ok(text)
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
        }
        Object::Array(items) => {
            let joined: String = items.iter().filter_map(string_operand).collect();
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

/// Collapse whitespace runs, keeping single line breaks and paragraph breaks
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut newlines = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newlines += 1;
            }
            pending_space = true;
            continue;
        }

        if pending_space && !result.is_empty() {
            match newlines {
                0 => result.push(' '),
                1 => result.push('\n'),
                _ => result.push_str("\n\n"),
            }
        }
        pending_space = false;
        newlines = 0;
        result.push(c);
    }

    result
}

#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    /// Write a PDF with one text line per page
    pub fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::write_pdf;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_pages_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.pdf");
        write_pdf(&path, &["Introduction to widgets", "Pricing Model", "Appendix"]);

        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].number, 1);
        assert!(pages[1].text.contains("Pricing Model"));
        assert!(pages[2].text.contains("Appendix"));
    }

    #[test]
    fn test_missing_pdf_fails_at_extraction() {
        let err = extract_pages(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert_eq!(err.stage(), Some(IndexStage::Extraction));
    }

    #[test]
    fn test_garbage_file_fails_at_extraction() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let err = extract_pages(&path).unwrap_err();
        assert_eq!(err.stage(), Some(IndexStage::Extraction));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a   b\t c "), "a b c");
        assert_eq!(normalize_whitespace("line\n  next"), "line\nnext");
        assert_eq!(normalize_whitespace("para\n\n\n\nnext"), "para\n\nnext");
    }
}
