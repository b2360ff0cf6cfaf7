//! Validation agent.
//!
//! Three independent sub-validators — structural, rule-based compliance
//! and date coherence — blended 40/40/20 into the overall score. The
//! record is a pure function of the classification result, the document
//! type, the rule set and the reference date.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use regex::Regex;

use super::{AgentError, AnalysisAgent, StageInput, StageSignal};
use crate::models::{
    CategoryCompliance, ComplianceLevel, ComplianceValidation, DateValidation, StageData,
    StageName, StructuralValidation, ValidationLevel, ValidationRecord,
};
use crate::pipeline::context::AnalysisContext;
use crate::pipeline::rules::{
    category_remediation, section_remediation, RulePredicate, REMEDIATION_DATE_ISSUES,
    REMEDIATION_FEW_DATES, REMEDIATION_SHORT_DOCUMENT,
};

const WEIGHT_STRUCTURAL: f32 = 0.4;
const WEIGHT_COMPLIANCE: f32 = 0.4;
const WEIGHT_DATES: f32 = 0.2;
const MAX_RECOMMENDATIONS: usize = 10;

pub struct ValidationAgent;

impl AnalysisAgent for ValidationAgent {
    fn name(&self) -> StageName {
        StageName::Validation
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
        let classification = input.classification()?;
        let doc_type = input
            .document
            .declared_type
            .unwrap_or(input.document.detected_type);

        // Three sub-validators with a checkpoint between each.
        signal.set_total(3);
        let structural = validate_structure(ctx, input, classification, doc_type)?;
        signal.checkpoint(1)?;
        let compliance = validate_compliance(ctx, input, &structural, doc_type)?;
        signal.checkpoint(2)?;
        let dates = validate_dates(input.text, input.reference_date);
        signal.checkpoint(3)?;

        let dates_score = if dates.has_adequate_dates { 100.0 } else { 50.0 };

        let overall_score = (WEIGHT_STRUCTURAL * structural.completion_pct
            + WEIGHT_COMPLIANCE * compliance.overall_pct
            + WEIGHT_DATES * dates_score)
            .clamp(0.0, 100.0);
        let overall_score = (overall_score * 100.0).round() / 100.0;
        let level = ValidationLevel::from_score(overall_score);

        let recommendations = build_recommendations(&structural, &compliance, &dates);
        let summary = format!(
            "Validación {} con puntaje {:.1}: {}/{} secciones, cumplimiento {:.0}%, {} fechas",
            level.as_str(),
            overall_score,
            structural.found_sections.len(),
            structural.required_sections.len(),
            compliance.overall_pct,
            dates.count
        );

        tracing::info!(
            doc_id = %input.document.doc_id,
            score = overall_score,
            level = level.as_str(),
            "Validation complete"
        );

        Ok(StageData::Validation(ValidationRecord {
            doc_id: input.document.doc_id.clone(),
            overall_score,
            level,
            structural,
            compliance,
            dates,
            recommendations,
            summary,
        }))
    }
}

fn validate_structure(
    ctx: &AnalysisContext,
    input: &StageInput<'_>,
    classification: &crate::models::ClassificationResult,
    doc_type: crate::models::DocType,
) -> Result<StructuralValidation, AgentError> {
    let required_sections = ctx.taxonomy.required_sections();
    let found: BTreeSet<String> = classification.found_sections().into_iter().collect();

    let found_sections: Vec<String> = required_sections
        .iter()
        .filter(|s| found.contains(*s))
        .cloned()
        .collect();
    let missing_sections: Vec<String> = required_sections
        .iter()
        .filter(|s| !found.contains(*s))
        .cloned()
        .collect();

    let completion_pct = if required_sections.is_empty() {
        100.0
    } else {
        found_sections.len() as f32 / required_sections.len() as f32 * 100.0
    };

    let total_chars = input.text.chars().count();

    Ok(StructuralValidation {
        required_sections,
        found_sections,
        missing_sections,
        completion_pct,
        has_dates: !find_dates(input.text).is_empty(),
        adequate_length: total_chars >= doc_type.min_length(),
        total_chars,
    })
}

fn validate_compliance(
    ctx: &AnalysisContext,
    input: &StageInput<'_>,
    structural: &StructuralValidation,
    doc_type: crate::models::DocType,
) -> Result<ComplianceValidation, AgentError> {
    let rules = ctx.rules.for_type(doc_type);
    let lower = input.text.to_lowercase();
    let found_sections: BTreeSet<&String> = structural.found_sections.iter().collect();

    let mut by_category: BTreeMap<String, CategoryCompliance> = BTreeMap::new();
    let mut rules_checked = 0;
    let mut rules_passed = 0;

    for rule in rules {
        let passed = match &rule.predicate {
            RulePredicate::Regex(pattern) => {
                let regex = Regex::new(&format!("(?i){pattern}"))
                    .map_err(|e| AgentError::Internal(format!("rule '{}': {e}", rule.name)))?;
                regex.is_match(input.text)
            }
            RulePredicate::Keywords(keywords) => keywords
                .iter()
                .any(|keyword| lower.contains(&keyword.to_lowercase())),
            RulePredicate::SectionPresence(section) => found_sections.contains(section),
        };

        let entry = by_category
            .entry(rule.category.clone())
            .or_insert_with(|| CategoryCompliance {
                rules_checked: 0,
                rules_passed: 0,
                pct: 0.0,
                found: Vec::new(),
                missing: Vec::new(),
            });
        entry.rules_checked += 1;
        rules_checked += 1;
        if passed {
            entry.rules_passed += 1;
            entry.found.push(rule.name.clone());
            rules_passed += 1;
        } else {
            entry.missing.push(rule.name.clone());
        }
    }

    for category in by_category.values_mut() {
        category.pct = if category.rules_checked == 0 {
            0.0
        } else {
            category.rules_passed as f32 / category.rules_checked as f32 * 100.0
        };
    }

    let overall_pct = if rules_checked == 0 {
        0.0
    } else {
        rules_passed as f32 / rules_checked as f32 * 100.0
    };

    Ok(ComplianceValidation {
        rules_checked,
        rules_passed,
        by_category,
        overall_pct,
        level: ComplianceLevel::from_pct(overall_pct),
    })
}

// ── Dates ──────────────────────────────────────────────────

const MONTHS: [(&str, u32); 12] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

struct FoundDate {
    raw: String,
    parsed: Option<NaiveDate>,
}

fn find_dates(text: &str) -> Vec<FoundDate> {
    let mut found = Vec::new();
    let mut seen = BTreeSet::new();

    let numeric =
        Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b").expect("static regex");
    for capture in numeric.captures_iter(text) {
        let raw = capture[0].to_string();
        if !seen.insert(raw.clone()) {
            continue;
        }
        let day: u32 = capture[1].parse().unwrap_or(0);
        let month: u32 = capture[2].parse().unwrap_or(0);
        let mut year: i32 = capture[3].parse().unwrap_or(0);
        if year < 100 {
            year += 2000;
        }
        found.push(FoundDate {
            raw,
            parsed: NaiveDate::from_ymd_opt(year, month, day),
        });
    }

    let iso = Regex::new(r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b").expect("static regex");
    for capture in iso.captures_iter(text) {
        let raw = capture[0].to_string();
        if !seen.insert(raw.clone()) {
            continue;
        }
        let year: i32 = capture[1].parse().unwrap_or(0);
        let month: u32 = capture[2].parse().unwrap_or(0);
        let day: u32 = capture[3].parse().unwrap_or(0);
        found.push(FoundDate {
            raw,
            parsed: NaiveDate::from_ymd_opt(year, month, day),
        });
    }

    let written = Regex::new(r"(?i)\b(\d{1,2})\s+de\s+([a-záéíóú]+)\s+de\s+(\d{4})\b")
        .expect("static regex");
    for capture in written.captures_iter(text) {
        let raw = capture[0].to_string();
        if !seen.insert(raw.to_lowercase()) {
            continue;
        }
        let day: u32 = capture[1].parse().unwrap_or(0);
        let month = MONTHS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&capture[2].to_lowercase()))
            .map(|(_, n)| *n);
        let year: i32 = capture[3].parse().unwrap_or(0);
        found.push(FoundDate {
            raw,
            parsed: month.and_then(|m| NaiveDate::from_ymd_opt(year, m, day)),
        });
    }

    found
}

fn validate_dates(text: &str, reference_date: NaiveDate) -> DateValidation {
    let dates = find_dates(text);

    let deadline_regex = Regex::new(
        r"(?i)plazo[^.]{0,60}\d+\s*(?:d[íi]as?|meses?|a[ñn]os?)|fecha\s+l[íi]mite|vencimiento|hasta\s+el\s+\d",
    )
    .expect("static regex");
    let deadlines = deadline_regex.find_iter(text).count();

    let mut issues = Vec::new();

    // Past-dated deadlines: a parsed date in deadline context that is
    // already behind the reference date.
    let deadline_date_regex =
        Regex::new(r"(?i)(?:fecha\s+l[íi]mite|vencimiento|hasta\s+el)[^.\d]{0,30}(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})")
            .expect("static regex");
    for capture in deadline_date_regex.captures_iter(text) {
        if let Some(date) = parse_dmy(&capture[1]) {
            if date < reference_date {
                issues.push(format!("Plazo vencido: {} es anterior a {}", &capture[1], reference_date));
            }
        }
    }

    // Contradictory ranges: desde X hasta Y with X after Y.
    let range_regex = Regex::new(
        r"(?i)desde\s+el?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\s+hasta\s+el?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
    )
    .expect("static regex");
    for capture in range_regex.captures_iter(text) {
        if let (Some(from), Some(to)) = (parse_dmy(&capture[1]), parse_dmy(&capture[2])) {
            if from > to {
                issues.push(format!(
                    "Rango contradictorio: {} posterior a {}",
                    &capture[1], &capture[2]
                ));
            }
        }
    }

    let count = dates.len();
    DateValidation {
        count,
        deadlines,
        samples: dates.iter().take(5).map(|d| d.raw.clone()).collect(),
        issues,
        has_adequate_dates: count >= 3 && deadlines >= 1,
    }
}

fn parse_dmy(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.split(['/', '-']).collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let mut year: i32 = parts[2].parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn build_recommendations(
    structural: &StructuralValidation,
    compliance: &ComplianceValidation,
    dates: &DateValidation,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if structural.completion_pct < 70.0 {
        for section in structural.missing_sections.iter().take(3) {
            recommendations.push(section_remediation(section));
        }
    }
    if !structural.adequate_length {
        recommendations.push(REMEDIATION_SHORT_DOCUMENT.to_string());
    }
    for (category, result) in &compliance.by_category {
        if result.pct < 70.0 {
            if let Some(text) = category_remediation(category) {
                recommendations.push(text.to_string());
            }
        }
    }
    if !dates.has_adequate_dates {
        recommendations.push(REMEDIATION_FEW_DATES.to_string());
    }
    if !dates.issues.is_empty() {
        recommendations.push(REMEDIATION_DATE_ISSUES.to_string());
    }

    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fingerprint, ClassificationResult, DocType, Document, SectionSummary};
    use crate::pipeline::context::test_context;
    use std::collections::BTreeMap;

    fn make_doc(doc_type: DocType) -> Document {
        Document {
            doc_id: fingerprint("doc validacion", doc_type),
            path: "doc.txt".into(),
            declared_type: Some(doc_type),
            detected_type: doc_type,
            created_at: chrono::Utc::now(),
        }
    }

    fn classification_with_sections(sections: &[&str]) -> ClassificationResult {
        let mut map = BTreeMap::new();
        for key in sections {
            let mut summary = SectionSummary::empty();
            summary.frag_ids.push(format!("d:{key}"));
            map.insert(key.to_string(), summary);
        }
        ClassificationResult {
            doc_id: "d".into(),
            sections: map,
            fragments: vec![],
            requirements: BTreeMap::new(),
            total_chars: 0,
        }
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn run_validator(
        ctx: &AnalysisContext,
        text: &str,
        doc_type: DocType,
        classification: &ClassificationResult,
    ) -> ValidationRecord {
        let doc = make_doc(doc_type);
        let input = StageInput {
            document: &doc,
            run_id: "run-test",
            text,
            fragments: &[],
            classification: Some(classification),
            reference_date: reference(),
        };
        let signal = StageSignal::unbounded();
        match ValidationAgent.run(ctx, &input, &signal).unwrap() {
            StageData::Validation(record) => record,
            other => panic!("unexpected stage data: {other:?}"),
        }
    }

    /// Full text that satisfies every rule category and carries dates.
    fn complete_text() -> String {
        let body = "CONVOCATORIA. Certificado de existencia y representación legal adjunto. \
             RUC de la empresa 1790016919001. Estados financieros auditados. Póliza de \
             cumplimiento del 5%. Experiencia específica en obra civil. Propuesta técnica \
             y propuesta económica. Especificaciones técnicas mínimas con certificaciones \
             requeridas, normas de calidad y estándares internacionales (norma ISO 9001). \
             Ley 1 de 2020, decreto 123, resolución 45, normatividad vigente y marco legal \
             aplicable. Valor del contrato: USD 1.200.000. Forma de pago con anticipo del \
             30% y garantías económicas. Plazo de ejecución de 180 días según cronograma \
             de actividades. Fechas de entrega: 15/08/2025, 30/09/2025 y 10 de diciembre \
             de 2025. Fecha límite 20/11/2025. Penalidades por retraso del 1 por mil."
            .to_string();
        // Pad to adequate length for an RFP.
        format!("{body}\n\n{}", "Detalle complementario de la obra. ".repeat(80))
    }

    #[test]
    fn complete_document_is_approved() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let classification = classification_with_sections(&[
            "convocatoria",
            "objeto",
            "condiciones_generales",
            "condiciones_particulares",
            "requisitos_tecnicos",
            "condiciones_economicas",
            "garantias",
            "plazos",
            "formularios",
        ]);
        let record = run_validator(&ctx, &complete_text(), DocType::Rfp, &classification);

        assert!(record.overall_score >= 80.0, "score {}", record.overall_score);
        assert_eq!(record.level, ValidationLevel::Aprobado);
        assert_eq!(record.structural.completion_pct, 100.0);
        assert!(record.dates.has_adequate_dates);
    }

    #[test]
    fn short_dateless_fragment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let classification = classification_with_sections(&["objeto"]);
        let text = "Objeto: adquisición de materiales. ".repeat(55);
        assert!(text.len() < 2_500);

        let record = run_validator(&ctx, &text, DocType::Proposal, &classification);

        assert!(!record.structural.adequate_length);
        assert!(!record.dates.has_adequate_dates);
        assert_eq!(record.level, ValidationLevel::Rechazado);
        assert!(
            record.recommendations.iter().any(|r| r.contains("fechas")),
            "no date recommendation in {:?}",
            record.recommendations
        );
    }

    #[test]
    fn score_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let classification = classification_with_sections(&["objeto", "plazos", "garantias"]);
        let text = complete_text();

        let a = run_validator(&ctx, &text, DocType::Rfp, &classification);
        let b = run_validator(&ctx, &text, DocType::Rfp, &classification);
        assert_eq!(a.overall_score, b.overall_score);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn missing_sections_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let classification = classification_with_sections(&["objeto"]);
        let record = run_validator(&ctx, "Texto corto.", DocType::Rfp, &classification);

        assert_eq!(record.structural.found_sections, vec!["objeto".to_string()]);
        assert_eq!(record.structural.missing_sections.len(), 8);
        assert!(record.structural.completion_pct < 20.0);
    }

    #[test]
    fn compliance_categories_scored_independently() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let classification = classification_with_sections(&[]);
        // Only legal references, nothing else.
        let text = "Ley 10 de 2019, decreto 500, resolución 77, normatividad vigente, marco legal aplicable.";
        let record = run_validator(&ctx, text, DocType::Rfp, &classification);

        let legal = record.compliance.by_category.get("REQUISITOS_LEGALES").unwrap();
        assert_eq!(legal.rules_passed, legal.rules_checked);
        let economic = record.compliance.by_category.get("REQUISITOS_ECONOMICOS").unwrap();
        assert!(economic.rules_passed < economic.rules_checked);
    }

    #[test]
    fn past_deadline_is_an_issue() {
        let dates = validate_dates(
            "Entrega inicial 01/02/2024. Revisión 15/02/2024. Cierre 01/03/2024. \
             Fecha límite 15/03/2024 para subsanaciones.",
            reference(),
        );
        assert!(dates.count >= 3);
        assert!(!dates.issues.is_empty());
    }

    #[test]
    fn contradictory_range_is_an_issue() {
        let dates = validate_dates(
            "Ejecución desde el 10/09/2025 hasta el 10/08/2025.",
            reference(),
        );
        assert!(dates.issues.iter().any(|i| i.contains("contradictorio")));
    }

    #[test]
    fn written_spanish_dates_are_found() {
        let dates = validate_dates("Se firmará el 12 de marzo de 2026.", reference());
        assert_eq!(dates.count, 1);
        assert_eq!(dates.samples[0], "12 de marzo de 2026");
    }

    #[test]
    fn duplicate_dates_counted_once() {
        let dates = validate_dates("Fecha 01/01/2026 y nuevamente 01/01/2026.", reference());
        assert_eq!(dates.count, 1);
    }
}
