use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Section key reserved for fragments no taxonomy section claims with
/// enough confidence.
pub const UNCLASSIFIED: &str = "unclassified";

/// Per-fragment outcome of the classification pass.
///
/// `distribution` holds the softmax confidence over the nine taxonomy
/// sections plus the unclassified slot; the entries sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentAssignment {
    pub ordinal: usize,
    pub section: String,
    pub confidence: f32,
    pub distribution: BTreeMap<String, f32>,
}

/// Aggregate view of one taxonomy section across a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub frag_ids: Vec<String>,
    pub aggregate_chars: usize,
    pub top_keywords: Vec<String>,
    /// Mean assignment confidence of the fragments in this section.
    pub confidence: f32,
    /// Mean of the section's fragment vectors, L2-normalized. Used by the
    /// comparison stage; absent when the run had no embeddings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Vec<f32>>,
}

impl SectionSummary {
    pub fn empty() -> Self {
        Self {
            frag_ids: Vec::new(),
            aggregate_chars: 0,
            top_keywords: Vec::new(),
            confidence: 0.0,
            centroid: None,
        }
    }
}

/// Full classification result for one document: section summaries over
/// the closed taxonomy, per-fragment assignments in ordinal order, and
/// the key requirements scanned out of each section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub doc_id: String,
    pub sections: BTreeMap<String, SectionSummary>,
    pub fragments: Vec<FragmentAssignment>,
    pub requirements: BTreeMap<String, Vec<String>>,
    pub total_chars: usize,
}

impl ClassificationResult {
    /// Sections that actually captured content, unclassified excluded.
    pub fn found_sections(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|(key, summary)| key.as_str() != UNCLASSIFIED && !summary.frag_ids.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
