//! Text extraction for document files passed on the command line.
//!
//! Plain text and HTML are returned as-is (markup is removed later by the
//! normalizer or `clean_markup`); PDFs go through `pdf-extract`.

use std::path::Path;

use anyhow::Context;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_HTML: &str = "text/html";
pub const MIME_TEXT: &str = "text/plain";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

/// Guess a content type from a file extension. Unknown extensions are
/// treated as plain text.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("html") | Some("htm") | Some("xhtml") => MIME_HTML,
        _ => MIME_TEXT,
    }
}

/// Extract UTF-8 text from file bytes of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        MIME_HTML | MIME_TEXT => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Read a file and extract its text.
pub fn read_document_file(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = extract_text(&bytes, content_type_for(path))
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_utf8_text_returns_error() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::NotUtf8));
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("a/Minutes.PDF")), MIME_PDF);
        assert_eq!(content_type_for(Path::new("page.htm")), MIME_HTML);
        assert_eq!(content_type_for(Path::new("notes")), MIME_TEXT);
    }

    #[test]
    fn reads_html_file_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ord.html");
        std::fs::write(&path, "<p>Be it ordained.</p>").unwrap();
        assert_eq!(read_document_file(&path).unwrap(), "<p>Be it ordained.</p>");
    }
}
