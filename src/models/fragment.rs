use serde::{Deserialize, Serialize};

/// A chunked window of document text. Immutable once produced by the
/// chunker; `ordinal` is a dense 0-based sequence per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub frag_id: String,
    pub doc_id: String,
    pub ordinal: usize,
    pub text: String,
    /// Byte span into the source text: [start, end).
    pub char_span: (usize, usize),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_confidence: Option<f32>,
}

impl Fragment {
    pub fn new(doc_id: &str, ordinal: usize, text: String, span: (usize, usize)) -> Self {
        Self {
            frag_id: format!("{doc_id}:{ordinal}"),
            doc_id: doc_id.to_string(),
            ordinal,
            text,
            char_span: span,
            vector: None,
            assigned_section: None,
            assignment_confidence: None,
        }
    }
}
