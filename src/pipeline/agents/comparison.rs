//! Comparison engine.
//!
//! Aligns N analyzed documents along shared dimensions: the taxonomy
//! sections plus the aggregate scores and levels. A participant whose
//! contributing stage failed reports `unavailable` for that dimension
//! only; it never aborts the comparison.

use std::collections::BTreeMap;

use chrono::Utc;

use super::AgentError;
use crate::models::{
    comparison_id, AnalysisArtifact, CategoricalDimension, Comparison, ComparisonSummary,
    DimensionValue, NumericDimension, SectionDimension,
};
use crate::pipeline::context::AnalysisContext;
use crate::pipeline::embedding::cosine_similarity;

/// Similarity sentinel for pairs where a participant has no centroid.
pub const SIMILARITY_UNAVAILABLE: f32 = -1.0;

pub struct ComparisonEngine;

impl ComparisonEngine {
    /// Build the differential view over artifacts of the same analysis
    /// level, in the given (upload) order.
    pub fn compare(
        ctx: &AnalysisContext,
        artifacts: &[AnalysisArtifact],
    ) -> Result<Comparison, AgentError> {
        if artifacts.len() < 2 {
            return Err(AgentError::Internal(
                "comparison requires at least two documents".to_string(),
            ));
        }
        let level = artifacts[0].analysis_level;
        if artifacts.iter().any(|a| a.analysis_level != level) {
            return Err(AgentError::Internal(
                "all compared artifacts must share the analysis level".to_string(),
            ));
        }

        let doc_ids: Vec<String> = artifacts.iter().map(|a| a.doc_id.clone()).collect();
        let artifact_refs: BTreeMap<String, String> = artifacts
            .iter()
            .map(|a| (a.doc_id.clone(), a.run_id.clone()))
            .collect();

        let mut numeric = BTreeMap::new();
        numeric.insert(
            "overall_score".to_string(),
            numeric_dimension(artifacts, |a| a.validation().map(|v| v.overall_score)),
        );
        numeric.insert(
            "compliance_pct".to_string(),
            numeric_dimension(artifacts, |a| {
                a.validation().map(|v| v.compliance.overall_pct)
            }),
        );
        numeric.insert(
            "risk_score".to_string(),
            // Lower risk is better, so ranking inverts the score.
            numeric_dimension_with_order(artifacts, |a| a.risk().map(|r| r.total_score), false),
        );
        numeric.insert(
            "ruc_score".to_string(),
            numeric_dimension(artifacts, |a| a.ruc().map(|r| r.score)),
        );

        let mut categorical = BTreeMap::new();
        categorical.insert(
            "validation_level".to_string(),
            categorical_dimension(artifacts, |a| {
                a.validation().map(|v| v.level.as_str().to_string())
            }),
        );
        categorical.insert(
            "compliance_level".to_string(),
            categorical_dimension(artifacts, |a| {
                a.validation().map(|v| v.compliance.level.as_str().to_string())
            }),
        );
        categorical.insert(
            "risk_level".to_string(),
            categorical_dimension(artifacts, |a| {
                a.risk().map(|r| r.overall_level.as_str().to_string())
            }),
        );
        categorical.insert(
            "ruc_bucket".to_string(),
            categorical_dimension(artifacts, |a| {
                a.ruc().map(|r| r.bucket.as_str().to_string())
            }),
        );

        let mut sections = BTreeMap::new();
        for key in ctx.taxonomy.keys() {
            sections.insert(key.clone(), section_dimension(artifacts, &key));
        }

        let summary = overall_summary(artifacts);

        Ok(Comparison {
            comparison_id: comparison_id(&doc_ids),
            doc_ids,
            artifact_refs,
            numeric,
            categorical,
            sections,
            summary,
            created_at: Utc::now(),
        })
    }
}

fn numeric_dimension(
    artifacts: &[AnalysisArtifact],
    value_of: impl Fn(&AnalysisArtifact) -> Option<f32>,
) -> NumericDimension {
    numeric_dimension_with_order(artifacts, value_of, true)
}

/// `higher_is_better` controls ranking direction; aggregates are
/// direction-agnostic.
fn numeric_dimension_with_order(
    artifacts: &[AnalysisArtifact],
    value_of: impl Fn(&AnalysisArtifact) -> Option<f32>,
    higher_is_better: bool,
) -> NumericDimension {
    let mut per_doc = BTreeMap::new();
    let mut valued: Vec<(String, f32)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for artifact in artifacts {
        match value_of(artifact) {
            Some(value) => {
                per_doc.insert(artifact.doc_id.clone(), DimensionValue::Number(value));
                valued.push((artifact.doc_id.clone(), value));
            }
            None => {
                per_doc.insert(artifact.doc_id.clone(), DimensionValue::Unavailable);
                missing.push(artifact.doc_id.clone());
            }
        }
    }

    let values: Vec<f32> = valued.iter().map(|(_, v)| *v).collect();
    let min = values.iter().copied().reduce(f32::min);
    let max = values.iter().copied().reduce(f32::max);
    let mean = if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    };

    // Best first; ties broken by the lexically earlier doc id; documents
    // without a value rank last in doc-id order.
    valued.sort_by(|a, b| {
        let ordering = if higher_is_better {
            b.1.partial_cmp(&a.1)
        } else {
            a.1.partial_cmp(&b.1)
        };
        ordering
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    missing.sort();

    let mut ranking: Vec<String> = valued.into_iter().map(|(id, _)| id).collect();
    ranking.extend(missing);

    NumericDimension {
        min,
        max,
        mean,
        per_doc,
        ranking,
    }
}

fn categorical_dimension(
    artifacts: &[AnalysisArtifact],
    value_of: impl Fn(&AnalysisArtifact) -> Option<String>,
) -> CategoricalDimension {
    let mut per_doc = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for artifact in artifacts {
        match value_of(artifact) {
            Some(label) => {
                *counts.entry(label.clone()).or_insert(0) += 1;
                per_doc.insert(artifact.doc_id.clone(), DimensionValue::Label(label));
            }
            None => {
                per_doc.insert(artifact.doc_id.clone(), DimensionValue::Unavailable);
            }
        }
    }

    // Mode; ties resolved toward the lexically smallest label.
    let mode = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(label, _)| label.clone());

    CategoricalDimension { mode, per_doc }
}

fn section_dimension(artifacts: &[AnalysisArtifact], section: &str) -> SectionDimension {
    let n = artifacts.len();
    let summaries: Vec<Option<&crate::models::SectionSummary>> = artifacts
        .iter()
        .map(|a| a.classification().and_then(|c| c.sections.get(section)))
        .collect();

    let mut similarity = vec![vec![SIMILARITY_UNAVAILABLE; n]; n];
    for i in 0..n {
        for j in 0..n {
            let pair = (
                summaries[i].and_then(|s| s.centroid.as_ref()),
                summaries[j].and_then(|s| s.centroid.as_ref()),
            );
            if let (Some(a), Some(b)) = pair {
                similarity[i][j] = cosine_similarity(a, b).clamp(0.0, 1.0);
            }
        }
    }

    let mut keyword_union: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
    for summary in summaries.iter().flatten() {
        for keyword in &summary.top_keywords {
            keyword_union.entry(keyword.clone()).or_default();
        }
    }
    for keyword in keyword_union.keys().cloned().collect::<Vec<_>>() {
        for (artifact, summary) in artifacts.iter().zip(summaries.iter()) {
            let present = summary
                .map(|s| s.top_keywords.contains(&keyword))
                .unwrap_or(false);
            if let Some(row) = keyword_union.get_mut(&keyword) {
                row.insert(artifact.doc_id.clone(), present);
            }
        }
    }

    let mut per_doc_chars = BTreeMap::new();
    for (artifact, summary) in artifacts.iter().zip(summaries.iter()) {
        let value = match summary {
            Some(s) => DimensionValue::Number(s.aggregate_chars as f32),
            None => DimensionValue::Unavailable,
        };
        per_doc_chars.insert(artifact.doc_id.clone(), value);
    }

    SectionDimension {
        similarity,
        keyword_union,
        per_doc_chars,
    }
}

fn overall_summary(artifacts: &[AnalysisArtifact]) -> ComparisonSummary {
    let scores: Vec<f32> = artifacts
        .iter()
        .filter_map(|a| a.validation().map(|v| v.overall_score))
        .collect();
    ComparisonSummary {
        best_score: scores.iter().copied().reduce(f32::max),
        worst_score: scores.iter().copied().reduce(f32::min),
        average_score: if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f32>() / scores.len() as f32)
        },
    }
}
