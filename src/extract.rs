//! Plain-text extraction for input documents (PDF, DOCX, text, Markdown).
//!
//! Callers supply bytes plus a type discriminator; this module returns plain
//! UTF-8 text. Extraction is a pure function of its input and holds no
//! state, so concurrent tasks may call it freely.

use std::io::Read;
use std::path::{Path, PathBuf};

use wallo_core::error::{Error, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Recognized document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Pdf,
    Docx,
    /// Plain text and Markdown; both are returned verbatim.
    Text,
}

impl DocumentType {
    /// Parse a type discriminator such as `"pdf"`, `"text"` or `"md"`.
    pub fn parse(discriminator: &str) -> Result<Self> {
        match discriminator.trim().to_ascii_lowercase().as_str() {
            "pdf" | "application/pdf" => Ok(DocumentType::Pdf),
            "docx"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Ok(DocumentType::Docx)
            }
            "text" | "txt" | "plain" | "text/plain" | "markdown" | "md" | "text/markdown" => {
                Ok(DocumentType::Text)
            }
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    /// Infer the type from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("{} has no file extension", path.display()))
            })?;
        Self::parse(ext)
    }
}

/// Extract plain text from `bytes`. Empty input yields empty text.
pub fn extract_text(bytes: &[u8], doc_type: DocumentType) -> Result<String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    match doc_type {
        DocumentType::Pdf => extract_pdf(bytes),
        DocumentType::Docx => extract_docx(bytes),
        DocumentType::Text => extract_plain(bytes),
    }
}

/// Read `path` and extract its text, inferring the type from the extension.
pub fn extract_file(path: &Path) -> Result<String> {
    let doc_type = DocumentType::from_path(path)?;
    let bytes = std::fs::read(path)
        .map_err(|e| Error::ExtractionFailed(format!("{}: {}", path.display(), e)))?;
    extract_text(&bytes, doc_type)
        .map_err(|e| match e {
            Error::ExtractionFailed(detail) => {
                Error::ExtractionFailed(format!("{}: {}", path.display(), detail))
            }
            other => other,
        })
}

/// [`extract_file`] on the blocking pool, so large PDFs never stall async callers.
pub async fn load_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || extract_file(&path))
        .await
        .map_err(|e| Error::ExtractionFailed(format!("extraction task failed: {}", e)))?
}

fn extract_plain(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::ExtractionFailed(format!("text is not valid UTF-8: {}", e)))
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::ExtractionFailed(format!("PDF extraction failed: {}", e)))?;
    if text.trim().is_empty() {
        return Err(Error::ExtractionFailed(
            "PDF has no extractable text layer".to_string(),
        ));
    }
    Ok(text)
}

fn ooxml_error(e: impl std::fmt::Display) -> Error {
    Error::ExtractionFailed(format!("DOCX extraction failed: {}", e))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_error)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml_error("word/document.xml not found"))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(ooxml_error)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_error("word/document.xml exceeds size limit"));
    }
    extract_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one paragraph (`<w:p>`) per block separated by a blank line.
fn extract_paragraphs(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().map_err(ooxml_error)?.as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n\n"))
}
