pub mod pdf;
pub mod types;

pub use types::{DocumentExtractor, ExtractedDocument, OcrEngine};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported artifact: {0}")]
    UnsupportedArtifact(String),

    #[error("Document appears empty — no text could be extracted")]
    EmptyDocument,

    #[error("Out-of-process conversion failed: {0}")]
    ConversionFailed(String),

    #[error("PDF parse error: {0}")]
    PdfParse(String),

    #[error("OCR engine failed: {0}")]
    Ocr(String),
}
