use std::io::{Cursor, Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ParseError;
use crate::parser::{DocumentFormat, ParseObserver, ParsedContent, Parser};

/// Extracts paragraph text from `word/document.xml`.
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DocxParser {
    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Docx)
    }

    fn parse(
        &self,
        bytes: &[u8],
        observer: &dyn ParseObserver,
    ) -> Result<ParsedContent, ParseError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ParseError::DocxProcessing(format!("Failed to open DOCX: {}", e)))?;
        observer.progress(20)?;

        let xml = read_document_xml(&mut archive)?;
        observer.progress(50)?;

        let text = parse_docx_xml(&xml)?;
        observer.progress(100)?;

        let units = text.lines().count();
        Ok(ParsedContent {
            text,
            format: DocumentFormat::Docx,
            units,
        })
    }
}

fn read_document_xml<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, ParseError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ParseError::DocxProcessing(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ParseError::DocxProcessing(format!("Failed to read document.xml: {}", e)))?;

    Ok(xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"p" => in_paragraph = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" if in_paragraph => {
                    text.push('\n');
                    in_paragraph = false;
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                // <w:br/> and <w:tab/> inside a run
                match e.local_name().as_ref() {
                    b"br" if in_paragraph => text.push('\n'),
                    b"tab" if in_paragraph => text.push('\t'),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) if in_text_element => {
                let raw = std::str::from_utf8(&e)
                    .map_err(|err| ParseError::DocxProcessing(format!("Invalid text: {}", err)))?;
                let decoded = quick_xml::escape::unescape(raw).unwrap_or(raw.into());
                text.push_str(&decoded);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::DocxProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NoopObserver;
    use std::io::Write;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    const TWO_PARAGRAPHS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p><w:r><w:t>Hello World</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
            </w:body>
        </w:document>"#;

    #[test]
    fn test_supports_docx_format() {
        let parser = DocxParser::new();
        assert!(parser.supports(DocumentFormat::Docx));
        assert!(!parser.supports(DocumentFormat::Pdf));
        assert!(!parser.supports(DocumentFormat::Text));
    }

    #[test]
    fn test_parse_simple_xml() {
        let text = parse_docx_xml(TWO_PARAGRAPHS).unwrap();
        assert_eq!(text, "Hello World\nSecond paragraph\n");
    }

    #[test]
    fn test_parse_docx_archive() {
        let bytes = build_docx(TWO_PARAGRAPHS);
        let parsed = DocxParser::new().parse(&bytes, &NoopObserver).unwrap();
        assert_eq!(parsed.format, DocumentFormat::Docx);
        assert_eq!(parsed.units, 2);
        assert!(parsed.text.contains("Second paragraph"));
    }

    #[test]
    fn test_not_a_zip() {
        let result = DocxParser::new().parse(b"plain text", &NoopObserver);
        assert!(matches!(result, Err(ParseError::DocxProcessing(_))));
    }

    #[test]
    fn test_zip_without_document_xml() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("other.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"x").unwrap();
            writer.finish().unwrap();
        }
        let result = DocxParser::new().parse(&buffer.into_inner(), &NoopObserver);
        assert!(matches!(result, Err(ParseError::DocxProcessing(_))));
    }
}
