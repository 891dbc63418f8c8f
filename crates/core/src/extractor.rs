use crate::error::IngestError;
use lopdf::Document;
use std::fs;
use std::path::Path;
use tracing::warn;

const FORM_FEED: char = '\u{000c}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PageExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path)
            .map_err(|error| IngestError::PdfParse(format!("{}: {error}", path.display())))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document.extract_text(&[page_no]).map_err(|error| {
                IngestError::PdfParse(format!("{} p.{page_no}: {error}", path.display()))
            })?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            warn!(path = %path.display(), "pdf has no text layer; skipping its pages");
        }

        Ok(pages)
    }
}

/// Plain text files; form feeds separate pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PageExtractor for PlainTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let raw = fs::read_to_string(path)?;
        Ok(split_form_feed_pages(&raw))
    }
}

pub fn split_form_feed_pages(raw: &str) -> Vec<PageText> {
    raw.split(FORM_FEED)
        .enumerate()
        .filter_map(|(index, chunk)| {
            let trimmed = chunk.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PageText {
                    number: (index + 1) as u32,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        if extension.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if extension.eq_ignore_ascii_case("txt") || extension.eq_ignore_ascii_case("md") {
            Some(Self::PlainText)
        } else {
            None
        }
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Pdf) => LopdfExtractor.extract_pages(path),
        Some(DocumentKind::PlainText) => PlainTextExtractor.extract_pages(path),
        None => Err(IngestError::PdfParse(format!(
            "unsupported document type: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_textless_pdf;
    use tempfile::tempdir;

    #[test]
    fn form_feed_splits_pages_and_keeps_numbering() {
        let pages = split_form_feed_pages("First\u{000C}  \u{000C}Third\n");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], PageText { number: 1, text: "First".to_string() });
        assert_eq!(pages[1], PageText { number: 3, text: "Third".to_string() });
    }

    #[test]
    fn kind_is_detected_case_insensitively() {
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::PlainText));
        assert_eq!(DocumentKind::from_path(Path::new("table.csv")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn pdf_without_text_yields_no_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scanned.pdf");
        write_textless_pdf(&path)?;

        assert_eq!(extract_page_texts(&path)?, Vec::new());
        Ok(())
    }

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
