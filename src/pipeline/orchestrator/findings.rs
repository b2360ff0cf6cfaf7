//! Key-finding synthesis.
//!
//! Findings and run-level recommendations are assembled from a fixed
//! rule table keyed on (stage, severity, category); no free-form text
//! generation is involved, so two runs over the same artifact produce
//! identical findings.

use crate::models::{
    AnalysisArtifact, RiskLevel, RucBucket, StageStatus, ValidationLevel, UNCLASSIFIED,
};

const MAX_FINDINGS: usize = 12;
const MAX_RECOMMENDATIONS: usize = 12;

/// Severity order used to sort findings, highest first.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
enum Severity {
    Info,
    Warning,
    Critical,
}

/// Derive key findings from the completed stage results.
pub fn synthesize_findings(artifact: &AnalysisArtifact) -> Vec<String> {
    let mut findings: Vec<(Severity, String)> = Vec::new();

    if let Some(validation) = artifact.validation() {
        match validation.level {
            ValidationLevel::Rechazado => findings.push((
                Severity::Critical,
                format!(
                    "Documento rechazado en validación con puntaje {:.1}",
                    validation.overall_score
                ),
            )),
            ValidationLevel::AprobadoConObservaciones => findings.push((
                Severity::Warning,
                format!(
                    "Documento aprobado con observaciones (puntaje {:.1})",
                    validation.overall_score
                ),
            )),
            ValidationLevel::Aprobado => findings.push((
                Severity::Info,
                format!(
                    "Documento aprobado en validación con puntaje {:.1}",
                    validation.overall_score
                ),
            )),
        }
        if !validation.structural.missing_sections.is_empty() {
            findings.push((
                Severity::Warning,
                format!(
                    "Secciones faltantes: {}",
                    validation.structural.missing_sections.join(", ")
                ),
            ));
        }
        if !validation.dates.issues.is_empty() {
            findings.push((
                Severity::Warning,
                format!("Problemas de fechas detectados: {}", validation.dates.issues.len()),
            ));
        }
    }

    if let Some(risk) = artifact.risk() {
        if risk.overall_level >= RiskLevel::High {
            findings.push((
                Severity::Critical,
                format!(
                    "Nivel de riesgo {} (puntaje {:.1})",
                    risk.overall_level.as_str(),
                    risk.total_score
                ),
            ));
        }
        for critical in &risk.critical_risks {
            findings.push((Severity::Critical, format!("Riesgo crítico — {critical}")));
        }
        if !risk.matrix.high.is_empty() && risk.overall_level < RiskLevel::High {
            findings.push((
                Severity::Warning,
                format!("Categorías de riesgo elevadas: {}", risk.matrix.high.join(", ")),
            ));
        }
    }

    if let Some(ruc) = artifact.ruc() {
        match ruc.bucket {
            RucBucket::Deficiente => findings.push((
                Severity::Warning,
                format!(
                    "Identificación del contratista deficiente ({} RUC, puntaje {:.0})",
                    ruc.found.len(),
                    ruc.score
                ),
            )),
            RucBucket::Bueno | RucBucket::Excelente => findings.push((
                Severity::Info,
                format!(
                    "Identificación del contratista {} ({} RUC)",
                    ruc.bucket.as_str(),
                    ruc.found.len()
                ),
            )),
        }
    }

    if let Some(classification) = artifact.classification() {
        if let Some(unclassified) = classification.sections.get(UNCLASSIFIED) {
            let total: usize = classification
                .sections
                .values()
                .map(|s| s.frag_ids.len())
                .sum();
            if total > 0 {
                let share = unclassified.frag_ids.len() as f32 / total as f32;
                if share > 0.3 {
                    findings.push((
                        Severity::Warning,
                        format!(
                            "{:.0}% del contenido no pudo asignarse a ninguna sección",
                            share * 100.0
                        ),
                    ));
                }
            }
        }
    }

    for (stage, result) in &artifact.stage_results {
        if result.status == StageStatus::Failed {
            findings.push((
                Severity::Warning,
                format!("Etapa {} falló: {}", stage.as_str(), result.errors.join("; ")),
            ));
        }
    }

    findings.sort_by(|a, b| b.0.cmp(&a.0));
    findings
        .into_iter()
        .take(MAX_FINDINGS)
        .map(|(_, text)| text)
        .collect()
}

/// Collate per-stage recommendations, validation first, deduplicated.
pub fn synthesize_recommendations(artifact: &AnalysisArtifact) -> Vec<String> {
    let mut recommendations = Vec::new();
    let mut push = |items: &[String]| {
        for item in items {
            if !recommendations.contains(item) {
                recommendations.push(item.clone());
            }
        }
    };

    if let Some(validation) = artifact.validation() {
        push(&validation.recommendations);
    }
    if let Some(risk) = artifact.risk() {
        push(&risk.mitigations);
    }
    if let Some(ruc) = artifact.ruc() {
        push(&ruc.recommendations);
    }

    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}
