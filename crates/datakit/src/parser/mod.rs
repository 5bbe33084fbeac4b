//! Reference text extractors behind the `Parser` seam.

pub mod docx;
pub mod pdf;
pub mod text;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Text,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" | "json" | "jsonl" | "csv" | "tsv" | "tex" => {
                Some(DocumentFormat::Text)
            }
            "docx" => Some(DocumentFormat::Docx),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

/// Text extracted from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    pub text: String,
    pub format: DocumentFormat,
    /// Lines, paragraphs or pages processed, depending on the format.
    pub units: usize,
}

/// Receives progress from a running parser.
///
/// Returning an error (normally `ParseError::Cancelled`) tells the parser to stop.
pub trait ParseObserver {
    fn progress(&self, percent: u8) -> Result<(), ParseError>;
}

/// Observer that ignores progress and never cancels.
pub struct NoopObserver;

impl ParseObserver for NoopObserver {
    fn progress(&self, _percent: u8) -> Result<(), ParseError> {
        Ok(())
    }
}

pub trait Parser: Send + Sync {
    fn supports(&self, format: DocumentFormat) -> bool;

    fn parse(&self, bytes: &[u8], observer: &dyn ParseObserver)
        -> Result<ParsedContent, ParseError>;
}

pub struct ParserRegistry {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistry {
    /// Registry with the built-in text, DOCX and PDF parsers.
    pub fn new() -> Self {
        Self::with_parsers(vec![
            Box::new(text::TextParser::new()),
            Box::new(docx::DocxParser::new()),
            Box::new(pdf::PdfParser::new()),
        ])
    }

    pub fn with_parsers(parsers: Vec<Box<dyn Parser>>) -> Self {
        Self { parsers }
    }

    /// Registers a parser ahead of the existing ones.
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        self.parsers.insert(0, parser);
    }

    pub fn parse(
        &self,
        file_type: &str,
        bytes: &[u8],
        observer: &dyn ParseObserver,
    ) -> Result<ParsedContent, ParseError> {
        let format = DocumentFormat::from_extension(file_type)
            .ok_or_else(|| ParseError::UnsupportedFormat(file_type.to_string()))?;

        for parser in &self.parsers {
            if parser.supports(format) {
                return parser.parse(bytes, observer);
            }
        }

        Err(ParseError::UnsupportedFormat(file_type.to_string()))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
