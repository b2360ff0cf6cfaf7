//! Classification agent.
//!
//! Assigns every fragment to one of the nine taxonomy sections by
//! blending a keyword pre-score with the cosine similarity to the
//! section's seed centroid, then softmaxes the blended scores into a
//! confidence distribution. Fragments whose best confidence stays under
//! the floor land in the `unclassified` slot.

use std::collections::BTreeMap;

use regex::Regex;

use super::{AgentError, AnalysisAgent, StageInput, StageSignal};
use crate::models::{
    ClassificationResult, FragmentAssignment, SectionSummary, StageData, StageName, UNCLASSIFIED,
};
use crate::pipeline::context::AnalysisContext;
use crate::pipeline::embedding::{cosine_similarity, l2_normalize};

/// Keyword weight in the blended score; the semantic side gets 1 - α.
const ALPHA: f32 = 0.4;
/// Softmax temperature.
const TAU: f32 = 0.5;
/// Confidence floor below which a fragment is unclassified.
const CONFIDENCE_FLOOR: f32 = 0.25;
/// Keyword count at which the keyword pre-score saturates.
const KEYWORD_SATURATION: f32 = 2.0;
/// Requirement extraction cap per section.
const MAX_REQUIREMENTS: usize = 20;

pub struct ClassificationAgent;

impl AnalysisAgent for ClassificationAgent {
    fn name(&self) -> StageName {
        StageName::Classification
    }

    fn requires(&self) -> &'static [StageName] {
        &[StageName::Chunking]
    }

    fn run(
        &self,
        ctx: &AnalysisContext,
        input: &StageInput<'_>,
        signal: &StageSignal,
    ) -> Result<StageData, AgentError> {
        let section_keys = ctx.taxonomy.keys();
        signal.set_total(input.fragments.len());

        let mut assignments = Vec::with_capacity(input.fragments.len());
        let mut section_frags: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut keyword_hits: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

        for (done, fragment) in input.fragments.iter().enumerate() {
            signal.checkpoint(done)?;

            let lower = fragment.text.to_lowercase();
            let mut scores = Vec::with_capacity(section_keys.len());

            for key in &section_keys {
                let section = ctx
                    .taxonomy
                    .get(key)
                    .ok_or_else(|| AgentError::Internal(format!("unknown section {key}")))?;

                let mut present = 0usize;
                for keyword in &section.keywords {
                    let occurrences = lower.matches(&keyword.to_lowercase()).count();
                    if occurrences > 0 {
                        present += 1;
                        *keyword_hits
                            .entry(key.clone())
                            .or_default()
                            .entry(keyword.clone())
                            .or_insert(0) += occurrences;
                    }
                }
                let keyword_score = (present as f32 / KEYWORD_SATURATION).min(1.0);

                let semantic_score = match (&fragment.vector, ctx.section_centroid(key)) {
                    (Some(vector), Some(centroid)) => {
                        cosine_similarity(vector, centroid).max(0.0)
                    }
                    _ => 0.0,
                };

                scores.push(ALPHA * keyword_score + (1.0 - ALPHA) * semantic_score);
            }

            let confidences = softmax(&scores, TAU);
            let (best_index, best_confidence) = argmax(&confidences);

            let mut distribution: BTreeMap<String, f32> = section_keys
                .iter()
                .cloned()
                .zip(confidences.iter().copied())
                .collect();
            distribution.insert(UNCLASSIFIED.to_string(), 0.0);

            let section = if best_confidence < CONFIDENCE_FLOOR {
                UNCLASSIFIED.to_string()
            } else {
                section_keys[best_index].clone()
            };

            section_frags
                .entry(section.clone())
                .or_default()
                .push(fragment.ordinal);
            assignments.push(FragmentAssignment {
                ordinal: fragment.ordinal,
                section,
                confidence: best_confidence,
                distribution,
            });
        }
        signal.checkpoint(input.fragments.len())?;

        // Section summaries over the closed taxonomy plus unclassified.
        let mut sections = BTreeMap::new();
        let mut all_keys = section_keys.clone();
        all_keys.push(UNCLASSIFIED.to_string());
        for key in &all_keys {
            let ordinals = section_frags.get(key).cloned().unwrap_or_default();
            sections.insert(key.clone(), summarize_section(ctx, input, key, &ordinals, &assignments, &keyword_hits));
        }

        let requirements = extract_requirements(ctx, input, &section_frags)?;
        let total_chars = input.fragments.iter().map(|f| f.text.len()).sum();

        tracing::info!(
            doc_id = %input.document.doc_id,
            fragments = assignments.len(),
            sections_found = section_frags.len(),
            "Classification complete"
        );

        Ok(StageData::Classification(ClassificationResult {
            doc_id: input.document.doc_id.clone(),
            sections,
            fragments: assignments,
            requirements,
            total_chars,
        }))
    }
}

fn summarize_section(
    ctx: &AnalysisContext,
    input: &StageInput<'_>,
    key: &str,
    ordinals: &[usize],
    assignments: &[FragmentAssignment],
    keyword_hits: &BTreeMap<String, BTreeMap<String, usize>>,
) -> SectionSummary {
    if ordinals.is_empty() {
        return SectionSummary::empty();
    }

    let frags: Vec<_> = input
        .fragments
        .iter()
        .filter(|f| ordinals.contains(&f.ordinal))
        .collect();
    let frag_ids = frags.iter().map(|f| f.frag_id.clone()).collect();
    let aggregate_chars = frags.iter().map(|f| f.text.len()).sum();

    let confidence = {
        let sum: f32 = assignments
            .iter()
            .filter(|a| a.section == key)
            .map(|a| a.confidence)
            .sum();
        sum / ordinals.len() as f32
    };

    // Three highest-weight keywords observed for this section.
    let top_keywords = keyword_hits
        .get(key)
        .map(|hits| {
            let mut ranked: Vec<(&String, &usize)> = hits.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            ranked.into_iter().take(3).map(|(k, _)| k.clone()).collect()
        })
        .unwrap_or_default();

    let centroid = section_centroid_of(&frags, ctx.embedding_dimension());

    SectionSummary {
        frag_ids,
        aggregate_chars,
        top_keywords,
        confidence,
        centroid,
    }
}

fn section_centroid_of(frags: &[&crate::models::Fragment], dimension: usize) -> Option<Vec<f32>> {
    let vectors: Vec<&Vec<f32>> = frags.iter().filter_map(|f| f.vector.as_ref()).collect();
    if vectors.is_empty() {
        return None;
    }
    let mut centroid = vec![0.0f32; dimension];
    for vector in &vectors {
        for (slot, value) in centroid.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    for slot in centroid.iter_mut() {
        *slot /= n;
    }
    l2_normalize(&mut centroid);
    Some(centroid)
}

/// Scan each section's fragments with the section's requirement
/// patterns, de-duplicating by whitespace-squashed lowercase text.
fn extract_requirements(
    ctx: &AnalysisContext,
    input: &StageInput<'_>,
    section_frags: &BTreeMap<String, Vec<usize>>,
) -> Result<BTreeMap<String, Vec<String>>, AgentError> {
    let mut requirements = BTreeMap::new();

    for (key, ordinals) in section_frags {
        let Some(section) = ctx.taxonomy.get(key) else {
            continue;
        };
        if section.requirement_patterns.is_empty() {
            continue;
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut found = Vec::new();
        for pattern in &section.requirement_patterns {
            let regex = Regex::new(&format!("(?i){pattern}"))
                .map_err(|e| AgentError::Internal(format!("pattern '{pattern}': {e}")))?;
            for ordinal in ordinals {
                let Some(fragment) = input.fragments.iter().find(|f| f.ordinal == *ordinal) else {
                    continue;
                };
                for found_match in regex.find_iter(&fragment.text) {
                    let text = found_match.as_str().trim();
                    let normalized = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
                    if seen.insert(normalized) {
                        found.push(text.to_string());
                        if found.len() >= MAX_REQUIREMENTS {
                            break;
                        }
                    }
                }
            }
        }
        if !found.is_empty() {
            requirements.insert(key.clone(), found);
        }
    }
    Ok(requirements)
}

fn softmax(scores: &[f32], tau: f32) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| ((s - max) / tau).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = 0;
    for (i, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = i;
        }
    }
    (best, values[best])
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
            doc_id: fingerprint("doc de prueba", DocType::Rfp),
            path: "pliego.txt".into(),
            declared_type: Some(DocType::Rfp),
            detected_type: DocType::Rfp,
            created_at: chrono::Utc::now(),
        }
    }

    fn embed_fragments(ctx: &AnalysisContext, doc_id: &str, texts: &[&str]) -> Vec<Fragment> {
        let vectors = ctx.embedder.embed_batch(texts).unwrap();
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut frag = Fragment::new(doc_id, i, text.to_string(), (i * 100, i * 100 + text.len()));
                frag.vector = Some(vectors[i].clone());
                frag
            })
            .collect()
    }

    fn run_classifier(ctx: &AnalysisContext, fragments: &[Fragment]) -> ClassificationResult {
        let doc = make_doc();
        let input = StageInput {
            document: &doc,
            run_id: "run-test",
            text: "",
            fragments,
            classification: None,
            reference_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        };
        let signal = StageSignal::unbounded();
        match ClassificationAgent.run(ctx, &input, &signal).unwrap() {
            StageData::Classification(result) => result,
            other => panic!("unexpected stage data: {other:?}"),
        }
    }

    /// A fragment saturated with one section's keywords lands in it.
    #[test]
    fn keyword_rich_fragment_is_assigned_to_its_section() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let garantias = ctx.taxonomy.get("garantias").unwrap().keywords.join(". ");
        let plazos = ctx.taxonomy.get("plazos").unwrap().keywords.join(". ");

        let fragments = embed_fragments(&ctx, "doc-1", &[&garantias, &plazos]);
        let result = run_classifier(&ctx, &fragments);

        assert_eq!(result.fragments[0].section, "garantias");
        assert_eq!(result.fragments[1].section, "plazos");
    }

    #[test]
    fn confidences_sum_to_one_across_taxonomy_and_unclassified() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let fragments = embed_fragments(
            &ctx,
            "doc-1",
            &[
                "garantía de fiel cumplimiento y póliza de cumplimiento",
                "texto sin relación alguna con licitaciones ni contratos",
            ],
        );
        let result = run_classifier(&ctx, &fragments);

        for assignment in &result.fragments {
            assert_eq!(assignment.distribution.len(), 10);
            let sum: f32 = assignment.distribution.values().sum();
            assert!((sum - 1.0).abs() < 1e-6, "distribution sums to {sum}");
        }
    }

    #[test]
    fn weak_fragment_goes_unclassified() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        // Content orthogonal to every section: no keywords, unrelated text.
        let fragments = embed_fragments(&ctx, "doc-1", &["zzz qqq www eee rrr ttt yyy uuu"]);
        let result = run_classifier(&ctx, &fragments);

        assert_eq!(result.fragments[0].section, UNCLASSIFIED);
        let unclassified = result.sections.get(UNCLASSIFIED).unwrap();
        assert_eq!(unclassified.frag_ids.len(), 1);
    }

    #[test]
    fn summaries_aggregate_chars_and_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let text = ctx.taxonomy.get("condiciones_economicas").unwrap().keywords.join(". ");
        let fragments = embed_fragments(&ctx, "doc-1", &[&text]);
        let result = run_classifier(&ctx, &fragments);

        let summary = result.sections.get("condiciones_economicas").unwrap();
        assert_eq!(summary.frag_ids, vec!["doc-1:0".to_string()]);
        assert_eq!(summary.aggregate_chars, text.len());
        assert!(!summary.top_keywords.is_empty());
        assert!(summary.top_keywords.len() <= 3);
        assert!(summary.centroid.is_some());
        assert!(summary.confidence > 0.0);
    }

    #[test]
    fn requirements_extracted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let text = "Plazos y cronograma. El plazo de ejecución será de 90 días contados \
                    desde la firma. El plazo de ejecución será de 90 días contados desde la firma. \
                    Cronograma de actividades adjunto. Fechas de entrega: hitos del proyecto.";
        let fragments = embed_fragments(&ctx, "doc-1", &[text]);
        let result = run_classifier(&ctx, &fragments);

        let Some(reqs) = result.requirements.get("plazos") else {
            panic!("no requirements for plazos: {:?}", result.requirements);
        };
        let plazo_matches: Vec<_> = reqs.iter().filter(|r| r.to_lowercase().contains("plazo")).collect();
        assert_eq!(plazo_matches.len(), 1, "duplicate requirement not collapsed: {reqs:?}");
    }

    #[test]
    fn cancellation_aborts_between_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let fragments = embed_fragments(&ctx, "doc-1", &["texto uno", "texto dos"]);
        let doc = make_doc();
        let input = StageInput {
            document: &doc,
            run_id: "run-test",
            text: "",
            fragments: &fragments,
            classification: None,
            reference_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        };
        let cancel = super::super::CancelToken::new();
        cancel.cancel();
        let signal = StageSignal::new(cancel, None);
        let result = ClassificationAgent.run(&ctx, &input, &signal);
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probs = softmax(&[0.9, 0.1, 0.0], 0.5);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }
}
