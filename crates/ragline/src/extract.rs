//! Multi-format text extraction for uploaded documents.
//!
//! Takes raw bytes plus a MIME type and returns plain UTF-8 text. PDF is
//! handled by `pdf-extract`, DOCX by reading `word/document.xml` out of
//! the ZIP container and collecting `w:t` runs, and plain text/markdown
//! by UTF-8 decoding with a latin-1 fallback. Unknown types fail with
//! [`RagError::UnsupportedFormat`]; parse failures with
//! [`RagError::CorruptFile`].

use std::io::Read;

use ragline_core::error::RagError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TXT: &str = "text/plain";
pub const MIME_MD: &str = "text/markdown";

/// Decompressed byte cap for a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions accepted by the ingestion surface.
pub fn supported_extensions() -> &'static [&'static str] {
    &["pdf", "docx", "txt", "md"]
}

/// Map a filename to its MIME type by extension.
pub fn mime_for_filename(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "txt" => Some(MIME_TXT),
        "md" => Some(MIME_MD),
        _ => None,
    }
}

/// Extract plain text from document bytes.
pub fn extract_text(bytes: &[u8], mime_type: &str, filename: &str) -> Result<String, RagError> {
    match mime_type {
        MIME_PDF => extract_pdf(bytes, filename),
        MIME_DOCX => extract_docx(bytes, filename),
        MIME_TXT | MIME_MD => Ok(extract_plain(bytes)),
        other => Err(RagError::UnsupportedFormat(format!(
            "{} ({})",
            other, filename
        ))),
    }
}

fn corrupt(filename: &str, reason: impl std::fmt::Display) -> RagError {
    RagError::CorruptFile {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}

fn extract_pdf(bytes: &[u8], filename: &str) -> Result<String, RagError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| corrupt(filename, e))
}

/// UTF-8 first; anything invalid is read as latin-1, which never fails.
fn extract_plain(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn extract_docx(bytes: &[u8], filename: &str) -> Result<String, RagError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| corrupt(filename, e))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| corrupt(filename, "word/document.xml not found"))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| corrupt(filename, e))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(corrupt(filename, "word/document.xml exceeds size limit"));
        }
    }

    extract_w_t_elements(&doc_xml, filename)
}

/// Collect the text runs (`w:t`) from a DOCX body, inserting newlines at
/// paragraph ends (`w:p`) so sentence detection still works downstream.
fn extract_w_t_elements(xml: &[u8], filename: &str) -> Result<String, RagError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text_run => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text_run = false;
                } else if name.as_ref() == b"p" && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(corrupt(filename, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
