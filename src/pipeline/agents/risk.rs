//! Risk agent.
//!
//! Scores the five fixed risk categories from two signals: the
//! indicator banks (term occurrences weighted by severity, log-damped)
//! and semantic proximity between document fragments and the category
//! seed centroids. Category scores are blended into a weighted total.

use std::collections::BTreeMap;

use super::{AgentError, AnalysisAgent, StageInput, StageSignal};
use crate::models::{
    CategoryRisk, RiskAssessment, RiskLevel, RiskMatrix, RiskMention, SemanticRisk, StageData,
    StageName,
};
use crate::pipeline::context::AnalysisContext;
use crate::pipeline::embedding::cosine_similarity;
use crate::pipeline::indicators::CRITICAL_CONTEXT_TERMS;

/// Multiplier for the indicator component of a category score.
const INDICATOR_GAIN: f32 = 10.0;
/// Multiplier for the semantic component of a category score.
const SEMANTIC_GAIN: f32 = 60.0;
/// How many top fragment similarities feed the semantic score.
const TOP_K_SEMANTIC: usize = 5;
/// Excerpt length for reported semantic risks.
const EXCERPT_CHARS: usize = 160;

pub struct RiskAgent;

impl AnalysisAgent for RiskAgent {
    fn name(&self) -> StageName {
        StageName::Risk
    }

    fn requires(&self) -> &'static [StageName] {
        &[StageName::Classification]
    }

    fn run(
        &self,
        ctx: &AnalysisContext,
        input: &StageInput<'_>,
        signal: &StageSignal,
    ) -> Result<StageData, AgentError> {
        let lower = input.text.to_lowercase();
        signal.set_total(ctx.indicators.categories.len());

        let mut category_risks = BTreeMap::new();
        let mut matrix = RiskMatrix::default();
        let mut critical_risks = Vec::new();
        let mut mitigations = Vec::new();
        let mut weighted_sum = 0.0f32;
        let mut weight_total = 0.0f32;

        for (done, category) in ctx.indicators.categories.iter().enumerate() {
            signal.checkpoint(done)?;

            // Indicator component: severity · ln(1 + occurrences).
            let mut mentions = Vec::new();
            let mut indicator_score = 0.0f32;
            for indicator in &category.indicators {
                let occurrences = lower.matches(&indicator.term.to_lowercase()).count();
                if occurrences > 0 {
                    indicator_score += indicator.severity as f32 * (1.0 + occurrences as f32).ln();
                    mentions.push(RiskMention {
                        term: indicator.term.clone(),
                        occurrences,
                        severity: indicator.severity,
                    });
                }
            }

            // Semantic component: mean of the top-5 fragment cosines
            // against the category centroid.
            let semantic_risks = top_semantic_risks(ctx, input, &category.key);
            let semantic_score = if semantic_risks.is_empty() {
                0.0
            } else {
                semantic_risks.iter().map(|r| r.similarity).sum::<f32>()
                    / semantic_risks.len() as f32
            };

            let score =
                (INDICATOR_GAIN * indicator_score + SEMANTIC_GAIN * semantic_score).min(100.0);
            let level = RiskLevel::from_score(score);

            match level {
                RiskLevel::Low => matrix.low.push(category.key.clone()),
                RiskLevel::Medium => matrix.medium.push(category.key.clone()),
                RiskLevel::High | RiskLevel::VeryHigh => matrix.high.push(category.key.clone()),
            }

            if level >= RiskLevel::High {
                if let Some(reason) =
                    critical_context(input, &mentions, &semantic_risks)
                {
                    critical_risks.push(format!(
                        "{}: {} ({})",
                        category.key,
                        category.description,
                        reason
                    ));
                }
            }

            if level >= RiskLevel::Medium {
                for mitigation in &category.mitigations {
                    let triggered = mitigation.trigger_terms.is_empty()
                        || mitigation
                            .trigger_terms
                            .iter()
                            .any(|t| mentions.iter().any(|m| &m.term == t));
                    if triggered && !mitigations.contains(&mitigation.template) {
                        mitigations.push(mitigation.template.clone());
                    }
                }
            }

            weighted_sum += category.weight * score;
            weight_total += category.weight;

            category_risks.insert(
                category.key.clone(),
                CategoryRisk {
                    score,
                    level,
                    indicators_detected: mentions.len(),
                    mentions,
                    semantic_risks,
                    weight: category.weight,
                },
            );
        }
        signal.checkpoint(ctx.indicators.categories.len())?;

        let total_score = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };
        let overall_level = RiskLevel::from_score(total_score);

        tracing::info!(
            doc_id = %input.document.doc_id,
            total_score,
            level = overall_level.as_str(),
            critical = critical_risks.len(),
            "Risk assessment complete"
        );

        Ok(StageData::Risk(RiskAssessment {
            doc_id: input.document.doc_id.clone(),
            category_risks,
            total_score,
            overall_level,
            critical_risks,
            mitigations,
            matrix,
        }))
    }
}

fn top_semantic_risks(
    ctx: &AnalysisContext,
    input: &StageInput<'_>,
    category: &str,
) -> Vec<SemanticRisk> {
    let Some(centroid) = ctx.risk_centroid(category) else {
        return Vec::new();
    };

    let mut scored: Vec<SemanticRisk> = input
        .fragments
        .iter()
        .filter_map(|fragment| {
            let vector = fragment.vector.as_ref()?;
            let similarity = cosine_similarity(vector, centroid).max(0.0);
            Some(SemanticRisk {
                ordinal: fragment.ordinal,
                similarity,
                excerpt: excerpt_of(&fragment.text),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    scored.truncate(TOP_K_SEMANTIC);
    scored
}

fn excerpt_of(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}…")
}

/// A high-band category is critical when its top contributing fragment
/// carries legal or monetary exposure terms. Returns the matched term.
fn critical_context(
    input: &StageInput<'_>,
    mentions: &[RiskMention],
    semantic_risks: &[SemanticRisk],
) -> Option<String> {
    // Top contributor: the fragment containing the hardest-hitting
    // mention, falling back to the closest semantic fragment.
    let top_fragment_text = mentions
        .iter()
        .max_by_key(|m| (m.severity, m.occurrences))
        .and_then(|mention| {
            let term = mention.term.to_lowercase();
            input
                .fragments
                .iter()
                .find(|f| f.text.to_lowercase().contains(&term))
                .map(|f| f.text.clone())
        })
        .or_else(|| {
            semantic_risks.first().and_then(|risk| {
                input
                    .fragments
                    .iter()
                    .find(|f| f.ordinal == risk.ordinal)
                    .map(|f| f.text.clone())
            })
        })
        .unwrap_or_else(|| input.text.to_string());

    let lower = top_fragment_text.to_lowercase();
    CRITICAL_CONTEXT_TERMS
        .iter()
        .find(|term| lower.contains(&term.to_lowercase()))
        .map(|term| format!("contexto crítico: '{term}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fingerprint, DocType, Document, Fragment};
    use crate::pipeline::context::test_context;
    use crate::pipeline::embedding::EmbeddingModel;
    use chrono::NaiveDate;

    fn make_doc() -> Document {
        Document {
            doc_id: fingerprint("doc riesgo", DocType::Proposal),
            path: "doc.txt".into(),
            declared_type: Some(DocType::Proposal),
            detected_type: DocType::Proposal,
            created_at: chrono::Utc::now(),
        }
    }

    fn run_risk(ctx: &AnalysisContext, text: &str) -> RiskAssessment {
        let vectors = ctx.embedder.embed_batch(&[text]).unwrap();
        let mut frag = Fragment::new("doc-r", 0, text.to_string(), (0, text.len()));
        frag.vector = Some(vectors[0].clone());
        let fragments = vec![frag];

        let doc = make_doc();
        let input = StageInput {
            document: &doc,
            run_id: "run-test",
            text,
            fragments: &fragments,
            classification: None,
            reference_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        };
        let signal = StageSignal::unbounded();
        match RiskAgent.run(ctx, &input, &signal).unwrap() {
            StageData::Risk(assessment) => assessment,
            other => panic!("unexpected stage data: {other:?}"),
        }
    }

    #[test]
    fn indicators_detected_with_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let text = "El proyecto usa tecnología no probada. La tecnología no probada \
                    carece de antecedentes y presenta obsolescencia técnica.";
        let assessment = run_risk(&ctx, text);

        let technical = assessment.category_risks.get("technical").unwrap();
        assert!(technical.indicators_detected >= 2);
        let mention = technical
            .mentions
            .iter()
            .find(|m| m.term == "tecnología no probada")
            .unwrap();
        assert_eq!(mention.occurrences, 2);
        assert_eq!(mention.severity, 3);
        assert!(technical.score > 0.0);
    }

    #[test]
    fn adding_occurrences_never_decreases_score() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let base = "Contrato de obra con costos ocultos en el presupuesto.";
        let more = format!("{base} Se advierten nuevamente costos ocultos en varios rubros.");

        let one = run_risk(&ctx, base);
        let two = run_risk(&ctx, &more);
        let economic_one = one.category_risks.get("economic").unwrap().score;
        let economic_two = two.category_risks.get("economic").unwrap().score;
        assert!(
            economic_two >= economic_one,
            "{economic_two} < {economic_one} after adding an occurrence"
        );
    }

    #[test]
    fn total_is_weighted_average() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let assessment = run_risk(&ctx, "Texto neutro sin indicadores de riesgo evidentes.");

        let mut expected = 0.0f32;
        let mut weights = 0.0f32;
        for risk in assessment.category_risks.values() {
            expected += risk.weight * risk.score;
            weights += risk.weight;
        }
        expected /= weights;
        assert!((assessment.total_score - expected).abs() < 1e-4);
    }

    #[test]
    fn heavy_indicators_reach_high_band_and_critical() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let text = "Proveedor único sin alternativas. El proveedor único presenta \
                    estabilidad financiera dudosa y referencias negativas; otra fuente \
                    confirma estabilidad financiera dudosa y referencias negativas. \
                    Proveedor único con sanciones internacionales. El incumplimiento \
                    acarrea multa del 10% del valor.";
        let assessment = run_risk(&ctx, text);

        let supplier = assessment.category_risks.get("supplier").unwrap();
        assert!(
            supplier.level >= RiskLevel::High,
            "supplier level {:?} score {}",
            supplier.level,
            supplier.score
        );
        assert!(assessment.matrix.high.contains(&"supplier".to_string()));
        assert!(
            assessment.critical_risks.iter().any(|c| c.contains("supplier")),
            "no critical risk recorded: {:?}",
            assessment.critical_risks
        );
        assert!(!assessment.mitigations.is_empty());
    }

    #[test]
    fn mitigations_follow_fired_indicators() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let text = "Cronograma apretado para la fase uno. El cronograma apretado obliga \
                    a turnos dobles. Cronograma apretado también en la fase dos. Se suma \
                    personal no calificado en cuadrillas y personal no calificado en \
                    supervisión, con recursos insuficientes declarados.";
        let assessment = run_risk(&ctx, text);

        let operational = assessment.category_risks.get("operational").unwrap();
        assert!(operational.level >= RiskLevel::Medium);
        assert!(
            assessment
                .mitigations
                .iter()
                .any(|m| m.contains("cronograma") || m.contains("personal clave")),
            "mitigations: {:?}",
            assessment.mitigations
        );
    }

    #[test]
    fn matrix_covers_all_categories() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let assessment = run_risk(&ctx, "Texto sin señales.");
        let bucketed = assessment.matrix.low.len()
            + assessment.matrix.medium.len()
            + assessment.matrix.high.len();
        assert_eq!(bucketed, assessment.category_risks.len());
    }

    #[test]
    fn semantic_risks_are_capped_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let assessment = run_risk(&ctx, "Riesgos del proveedor y su cadena de suministro.");
        for risk in assessment.category_risks.values() {
            assert!(risk.semantic_risks.len() <= TOP_K_SEMANTIC);
            for pair in risk.semantic_risks.windows(2) {
                assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
    }
}
