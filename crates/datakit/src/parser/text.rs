use crate::error::ParseError;
use crate::parser::{DocumentFormat, ParseObserver, ParsedContent, Parser};

/// Lines per progress report.
const LINES_PER_STEP: usize = 256;

/// UTF-8 text, with the BOM stripped and line endings normalized to `\n`.
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for TextParser {
    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }

    fn parse(
        &self,
        bytes: &[u8],
        observer: &dyn ParseObserver,
    ) -> Result<ParsedContent, ParseError> {
        let raw =
            std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidEncoding(e.to_string()))?;
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let lines: Vec<&str> = raw.lines().collect();
        let total = lines.len().max(1);
        let mut text = String::with_capacity(raw.len());

        for (i, chunk) in lines.chunks(LINES_PER_STEP).enumerate() {
            for line in chunk {
                text.push_str(line.trim_end_matches('\r'));
                text.push('\n');
            }
            let done = ((i + 1) * LINES_PER_STEP).min(total);
            observer.progress((done * 100 / total) as u8)?;
        }

        Ok(ParsedContent {
            text,
            format: DocumentFormat::Text,
            units: lines.len(),
        })
    }
}
