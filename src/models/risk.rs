use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn from_score(score: f32) -> Self {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Medium
        } else if score < 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        }
    }

    /// Recommended handling for risks in this band.
    pub fn action(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Monitoreo rutinario",
            RiskLevel::Medium => "Atención y mitigación",
            RiskLevel::High => "Mitigación urgente",
            RiskLevel::VeryHigh => "Intervención inmediata",
        }
    }
}

/// One indicator term that fired, with how often and how hard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMention {
    pub term: String,
    pub occurrences: usize,
    pub severity: u8,
}

/// A fragment semantically close to a risk category's seed corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRisk {
    pub ordinal: usize,
    pub similarity: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRisk {
    pub score: f32,
    pub level: RiskLevel,
    pub indicators_detected: usize,
    pub mentions: Vec<RiskMention>,
    pub semantic_risks: Vec<SemanticRisk>,
    pub weight: f32,
}

/// Category names bucketed by their risk band. `high` collects both
/// high and very_high categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMatrix {
    pub low: Vec<String>,
    pub medium: Vec<String>,
    pub high: Vec<String>,
}

/// Weighted multi-category risk assessment for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub doc_id: String,
    pub category_risks: BTreeMap<String, CategoryRisk>,
    /// Σ weight·score / Σ weight over all categories.
    pub total_score: f32,
    pub overall_level: RiskLevel,
    pub critical_risks: Vec<String>,
    pub mitigations: Vec<String>,
    pub matrix: RiskMatrix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_buckets() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::VeryHigh);
    }

    #[test]
    fn level_serializes_snake_case() {
        let json = serde_json::to_string(&RiskLevel::VeryHigh).unwrap();
        assert_eq!(json, "\"very_high\"");
    }
}
