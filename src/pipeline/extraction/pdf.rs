//! Embedded-text PDF extraction via lopdf.

use std::path::Path;

use super::ExtractionError;

/// Extract the embedded text of each page. Pages whose text operators
/// cannot be decoded yield an empty string rather than aborting the
/// document; the caller judges overall density.
pub fn extract_pdf(path: &Path) -> Result<Vec<String>, ExtractionError> {
    let document = lopdf::Document::load(path).map_err(|e| ExtractionError::PdfParse(e.to_string()))?;

    let pages = document.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => texts.push(text),
            Err(e) => {
                tracing::debug!(page = page_number, error = %e, "Page text extraction failed");
                texts.push(String::new());
            }
        }
    }

    if texts.is_empty() {
        return Err(ExtractionError::PdfParse("document has no pages".to_string()));
    }
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.pdf");
        std::fs::write(&path, b"%PDF-1.4 corrupt garbage").unwrap();

        let result = extract_pdf(&path);
        assert!(matches!(result, Err(ExtractionError::PdfParse(_))));
    }
}
