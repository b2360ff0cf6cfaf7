use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::pdf::extract_pdf;
use super::ExtractionError;

/// Normalized output of the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: Option<usize>,
    pub table_count: Option<usize>,
    /// True when page text density fell below threshold and no OCR
    /// engine was available to recover the scanned pages.
    pub degraded: bool,
}

/// OCR adapter contract. The core never ships an OCR engine; hosts
/// plug one in for scanned PDFs.
pub trait OcrEngine: Send + Sync {
    /// Extract text per page from a (likely scanned) document.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// Minimum mean characters per PDF page before the extractor considers
/// the embedded text unusable and reaches for OCR.
pub const PDF_DENSITY_THRESHOLD: usize = 200;

/// Normalizes any supported artifact to plain text plus metadata.
///
/// PDF uses embedded text first and falls back to the OCR adapter only
/// when density is below threshold. DOCX and spreadsheets go through an
/// out-of-process LibreOffice conversion to PDF; a failed conversion is
/// an `UnsupportedArtifact`, never silently empty text.
pub struct DocumentExtractor {
    ocr: Option<Box<dyn OcrEngine>>,
    soffice_bin: String,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self {
            ocr: None,
            soffice_bin: std::env::var("SOFFICE_BIN").unwrap_or_else(|_| "soffice".to_string()),
        }
    }

    pub fn with_ocr(mut self, ocr: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let extracted = match extension.as_str() {
            "txt" | "md" => self.extract_plain(path)?,
            "pdf" => self.extract_pdf_with_fallback(path)?,
            "doc" | "docx" | "xls" | "xlsx" => self.extract_via_conversion(path)?,
            other => {
                return Err(ExtractionError::UnsupportedArtifact(format!(
                    "extension '.{other}' is not supported"
                )))
            }
        };

        if extracted.text.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        Ok(extracted)
    }

    fn extract_plain(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let text = std::fs::read_to_string(path)?;
        let table_count = estimate_table_count(&text);
        Ok(ExtractedDocument {
            text,
            page_count: None,
            table_count: Some(table_count),
            degraded: false,
        })
    }

    fn extract_pdf_with_fallback(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let pages = extract_pdf(path)?;
        let page_count = pages.len();
        let total_chars: usize = pages.iter().map(|p| p.trim().len()).sum();
        let density = if page_count > 0 { total_chars / page_count } else { 0 };

        if density >= PDF_DENSITY_THRESHOLD {
            let text = pages.join("\n\n");
            let table_count = estimate_table_count(&text);
            return Ok(ExtractedDocument {
                text,
                page_count: Some(page_count),
                table_count: Some(table_count),
                degraded: false,
            });
        }

        // Embedded text too thin: likely a scanned document.
        if let Some(ocr) = &self.ocr {
            tracing::info!(
                path = %path.display(),
                density,
                "PDF text density below threshold, falling back to OCR"
            );
            let ocr_pages = ocr.extract_pages(path)?;
            let text = ocr_pages.join("\n\n");
            let table_count = estimate_table_count(&text);
            return Ok(ExtractedDocument {
                text,
                page_count: Some(ocr_pages.len().max(page_count)),
                table_count: Some(table_count),
                degraded: false,
            });
        }

        tracing::warn!(
            path = %path.display(),
            density,
            "PDF text density below threshold and no OCR engine configured"
        );
        let text = pages.join("\n\n");
        let table_count = estimate_table_count(&text);
        Ok(ExtractedDocument {
            text,
            page_count: Some(page_count),
            table_count: Some(table_count),
            degraded: true,
        })
    }

    /// Convert office formats to PDF out of process, then extract.
    fn extract_via_conversion(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let workdir = std::env::temp_dir().join(format!("licitar-convert-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workdir)?;

        let output = Command::new(&self.soffice_bin)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&workdir)
            .arg(path)
            .output()
            .map_err(|e| {
                ExtractionError::UnsupportedArtifact(format!(
                    "conversion tool '{}' not available: {e}",
                    self.soffice_bin
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = std::fs::remove_dir_all(&workdir);
            return Err(ExtractionError::UnsupportedArtifact(format!(
                "conversion failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let converted = converted_pdf_path(&workdir, path);
        let result = match converted {
            Some(pdf_path) => self.extract_pdf_with_fallback(&pdf_path),
            None => Err(ExtractionError::UnsupportedArtifact(
                "conversion produced no output file".to_string(),
            )),
        };
        let _ = std::fs::remove_dir_all(&workdir);
        result
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn converted_pdf_path(workdir: &Path, source: &Path) -> Option<PathBuf> {
    let stem = source.file_stem()?;
    let candidate = workdir.join(stem).with_extension("pdf");
    candidate.exists().then_some(candidate)
}

/// Rough table count: contiguous groups of lines with at least two
/// column separators (tab or pipe) count as one table each.
pub fn estimate_table_count(text: &str) -> usize {
    let mut tables = 0;
    let mut in_table = false;
    for line in text.lines() {
        let separators = line.matches('\t').count() + line.matches('|').count();
        let tabular = separators >= 2 && !line.trim().is_empty();
        if tabular && !in_table {
            tables += 1;
        }
        in_table = tabular;
    }
    tables
}
