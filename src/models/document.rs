use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tender document families the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Rfp,
    Proposal,
    Contract,
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Rfp => "rfp",
            DocType::Proposal => "proposal",
            DocType::Contract => "contract",
            DocType::Unknown => "unknown",
        }
    }

    /// Minimum character count for a document of this type to count as
    /// adequately developed. Shorter submissions are routinely returned
    /// by contracting entities for lack of substance.
    pub fn min_length(&self) -> usize {
        match self {
            DocType::Rfp => 3_000,
            DocType::Proposal => 2_500,
            DocType::Contract => 2_000,
            DocType::Unknown => 2_500,
        }
    }

    /// Heuristic detection from the document header (first ~2000 chars).
    pub fn detect(text: &str) -> DocType {
        let head: String = text.chars().take(2_000).collect::<String>().to_lowercase();
        if head.contains("pliego") || head.contains("convocatoria") || head.contains("licitaci") {
            DocType::Rfp
        } else if head.contains("propuesta") || head.contains("oferta") {
            DocType::Proposal
        } else if head.contains("contrato") || head.contains("las partes") {
            DocType::Contract
        } else {
            DocType::Unknown
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of an analysis run. Comprehensive adds the semantic scoring
/// paths that require an embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisLevel {
    Basic,
    Comprehensive,
}

impl AnalysisLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisLevel::Basic => "basic",
            AnalysisLevel::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for AnalysisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested tender document. Immutable once created; all downstream
/// records reference it by `doc_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub path: PathBuf,
    pub declared_type: Option<DocType>,
    pub detected_type: DocType,
    pub created_at: DateTime<Utc>,
}

/// Collapse whitespace runs and normalize line endings so the fingerprint
/// survives re-extraction quirks (trailing spaces, CRLF round-trips).
pub fn canonicalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

/// Stable fingerprint: SHA-256 of the canonicalized text prefixed by the
/// declared type. Re-uploading byte-identical content yields the same id.
pub fn fingerprint(text: &str, declared: DocType) -> String {
    let canonical = canonicalize_text(text);
    let mut hasher = Sha256::new();
    hasher.update(declared.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// One pipeline execution is addressed by doc id + analysis level.
pub fn run_id(doc_id: &str, level: AnalysisLevel) -> String {
    format!("{doc_id}-{}", level.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_stable_across_ingests() {
        let text = "CONVOCATORIA\n\nObjeto de la contratación: obra civil.";
        let a = fingerprint(text, DocType::Rfp);
        let b = fingerprint(text, DocType::Rfp);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_declared_type() {
        let text = "Propuesta económica para la obra.";
        assert_ne!(
            fingerprint(text, DocType::Rfp),
            fingerprint(text, DocType::Proposal)
        );
    }

    #[test]
    fn fingerprint_ignores_whitespace_noise() {
        let a = fingerprint("Objeto  de la\tcontratación", DocType::Rfp);
        let b = fingerprint("Objeto de la contratación  ", DocType::Rfp);
        assert_eq!(a, b);
    }

    #[test]
    fn detect_rfp_from_header() {
        assert_eq!(
            DocType::detect("PLIEGO DE CONDICIONES\nSECCIÓN I CONVOCATORIA"),
            DocType::Rfp
        );
    }

    #[test]
    fn detect_proposal_from_header() {
        assert_eq!(
            DocType::detect("PROPUESTA TÉCNICA Y ECONÓMICA\nConsorcio Vial"),
            DocType::Proposal
        );
    }

    #[test]
    fn detect_unknown_when_no_signal() {
        assert_eq!(DocType::detect("Informe mensual de avance"), DocType::Unknown);
    }

    #[test]
    fn run_id_combines_doc_and_level() {
        let id = run_id("abc123", AnalysisLevel::Comprehensive);
        assert_eq!(id, "abc123-comprehensive");
    }
}
