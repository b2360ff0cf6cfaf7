use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Value of one comparison dimension for one document. `Unavailable`
/// marks participants whose contributing stage did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DimensionValue {
    Number(f32),
    Label(String),
    Unavailable,
}

/// Numeric dimension aggregated over the participants that reported it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericDimension {
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f32>,
    pub per_doc: BTreeMap<String, DimensionValue>,
    /// Doc ids best-first; ties broken by the lexically earlier doc id.
    /// Documents without a value rank last.
    pub ranking: Vec<String>,
}

/// Categorical (level-valued) dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalDimension {
    pub mode: Option<String>,
    pub per_doc: BTreeMap<String, DimensionValue>,
}

/// Textual dimension over one taxonomy section: pairwise centroid
/// similarity plus the union of observed keywords with per-doc presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDimension {
    /// NxN cosine matrix in `doc_ids` order; -1.0 marks pairs where a
    /// participant had no centroid for this section.
    pub similarity: Vec<Vec<f32>>,
    pub keyword_union: BTreeMap<String, BTreeMap<String, bool>>,
    pub per_doc_chars: BTreeMap<String, DimensionValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub best_score: Option<f32>,
    pub worst_score: Option<f32>,
    pub average_score: Option<f32>,
}

/// Read-only differential view over a frozen set of analysis artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub comparison_id: String,
    /// Participants in upload order.
    pub doc_ids: Vec<String>,
    /// Doc id → run id of the artifact the comparison was built from.
    pub artifact_refs: BTreeMap<String, String>,
    pub numeric: BTreeMap<String, NumericDimension>,
    pub categorical: BTreeMap<String, CategoricalDimension>,
    pub sections: BTreeMap<String, SectionDimension>,
    pub summary: ComparisonSummary,
    pub created_at: DateTime<Utc>,
}

/// Comparison id from the participating doc ids. The set is hashed in
/// sorted order so one frozen set of documents maps to one comparison
/// regardless of upload order.
pub fn comparison_id(doc_ids: &[String]) -> String {
    let mut sorted: Vec<&String> = doc_ids.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_id_is_order_insensitive() {
        let a = comparison_id(&["doc-a".into(), "doc-b".into()]);
        let b = comparison_id(&["doc-b".into(), "doc-a".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn comparison_id_distinguishes_sets() {
        let a = comparison_id(&["doc-a".into(), "doc-b".into()]);
        let b = comparison_id(&["doc-a".into(), "doc-c".into()]);
        assert_ne!(a, b);
    }
}
