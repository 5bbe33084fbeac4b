use lopdf::Document;

use crate::error::ParseError;
use crate::parser::{DocumentFormat, ParseObserver, ParsedContent, Parser};

/// Extracts embedded text page by page. Pages without extractable text are skipped.
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PdfParser {
    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }

    fn parse(
        &self,
        bytes: &[u8],
        observer: &dyn ParseObserver,
    ) -> Result<ParsedContent, ParseError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| ParseError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let pages = doc.get_pages();
        let total = pages.len().max(1);
        let mut text = String::new();

        for (i, page_num) in pages.keys().enumerate() {
            match doc.extract_text(&[*page_num]) {
                Ok(page_text) => {
                    text.push_str(page_text.trim_end());
                    text.push('\n');
                }
                Err(e) => {
                    log::debug!("No extractable text on page {}: {}", page_num, e);
                }
            }
            observer.progress(((i + 1) * 100 / total) as u8)?;
        }

        Ok(ParsedContent {
            text,
            format: DocumentFormat::Pdf,
            units: pages.len(),
        })
    }
}
