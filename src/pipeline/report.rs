//! Report assembler.
//!
//! Pure transformation from an analysis artifact or a comparison into a
//! render-ready bundle: executive summary, per-stage breakdown, metrics,
//! findings and recommendations. The bundle is format-agnostic; JSON and
//! HTML emitters live here, PDF typesetting belongs to an external
//! renderer consuming the same bundle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisArtifact, Comparison, DimensionValue, StageStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub headline: String,
    pub status: String,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSection {
    pub name: String,
    pub status: String,
    pub detail: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub kind: ReportKind,
    pub subject_id: String,
    pub generated_at: DateTime<Utc>,
    pub executive_summary: ExecutiveSummary,
    pub stages: Vec<StageSection>,
    pub metrics: BTreeMap<String, f64>,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Analysis,
    Comparison,
}

impl ReportBundle {
    pub fn from_artifact(artifact: &AnalysisArtifact) -> Self {
        let mut metrics = BTreeMap::new();
        if let Some(validation) = artifact.validation() {
            metrics.insert("overall_score".to_string(), validation.overall_score as f64);
            metrics.insert(
                "compliance_pct".to_string(),
                validation.compliance.overall_pct as f64,
            );
            metrics.insert(
                "structural_completion_pct".to_string(),
                validation.structural.completion_pct as f64,
            );
            metrics.insert("dates_found".to_string(), validation.dates.count as f64);
        }
        if let Some(risk) = artifact.risk() {
            metrics.insert("risk_score".to_string(), risk.total_score as f64);
            metrics.insert(
                "critical_risks".to_string(),
                risk.critical_risks.len() as f64,
            );
        }
        if let Some(ruc) = artifact.ruc() {
            metrics.insert("ruc_score".to_string(), ruc.score as f64);
            metrics.insert("rucs_found".to_string(), ruc.found.len() as f64);
        }

        let stages = artifact
            .stage_results
            .iter()
            .map(|(name, result)| StageSection {
                name: name.as_str().to_string(),
                status: status_label(result.status).to_string(),
                detail: stage_detail(artifact, *name),
                errors: result.errors.clone(),
            })
            .collect();

        let headline = match artifact.validation() {
            Some(validation) => format!(
                "Análisis {} — {} (puntaje {:.1})",
                short_id(&artifact.doc_id),
                validation.level.as_str(),
                validation.overall_score
            ),
            None => format!("Análisis {}", short_id(&artifact.doc_id)),
        };

        Self {
            kind: ReportKind::Analysis,
            subject_id: artifact.run_id.clone(),
            generated_at: Utc::now(),
            executive_summary: ExecutiveSummary {
                headline,
                status: artifact.overall_status.as_str().to_string(),
                highlights: artifact.key_findings.iter().take(5).cloned().collect(),
            },
            stages,
            metrics,
            findings: artifact.key_findings.clone(),
            recommendations: artifact.recommendations.clone(),
        }
    }

    pub fn from_comparison(comparison: &Comparison) -> Self {
        let mut metrics = BTreeMap::new();
        if let Some(best) = comparison.summary.best_score {
            metrics.insert("best_score".to_string(), best as f64);
        }
        if let Some(worst) = comparison.summary.worst_score {
            metrics.insert("worst_score".to_string(), worst as f64);
        }
        if let Some(average) = comparison.summary.average_score {
            metrics.insert("average_score".to_string(), average as f64);
        }
        metrics.insert("documents".to_string(), comparison.doc_ids.len() as f64);

        let mut highlights = Vec::new();
        if let Some(overall) = comparison.numeric.get("overall_score") {
            if let Some(winner) = overall.ranking.first() {
                highlights.push(format!("Mejor puntaje global: {}", short_id(winner)));
            }
        }
        if let Some(risk) = comparison.numeric.get("risk_score") {
            if let Some(safest) = risk.ranking.first() {
                highlights.push(format!("Menor riesgo: {}", short_id(safest)));
            }
        }

        let stages = comparison
            .numeric
            .iter()
            .map(|(dimension, values)| StageSection {
                name: dimension.clone(),
                status: "success".to_string(),
                detail: values
                    .per_doc
                    .iter()
                    .map(|(doc, value)| format!("{}: {}", short_id(doc), dimension_label(value)))
                    .collect::<Vec<_>>()
                    .join("; "),
                errors: Vec::new(),
            })
            .collect();

        Self {
            kind: ReportKind::Comparison,
            subject_id: comparison.comparison_id.clone(),
            generated_at: Utc::now(),
            executive_summary: ExecutiveSummary {
                headline: format!(
                    "Comparación de {} documentos",
                    comparison.doc_ids.len()
                ),
                status: "success".to_string(),
                highlights,
            },
            stages,
            metrics,
            findings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Minimal HTML emitter; styling belongs to downstream renderers.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>");
        html.push_str(&escape(&self.executive_summary.headline));
        html.push_str("</title></head><body>");
        html.push_str(&format!(
            "<h1>{}</h1><p>Estado: {}</p>",
            escape(&self.executive_summary.headline),
            escape(&self.executive_summary.status)
        ));

        if !self.metrics.is_empty() {
            html.push_str("<h2>Métricas</h2><table>");
            for (name, value) in &self.metrics {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{value:.2}</td></tr>",
                    escape(name)
                ));
            }
            html.push_str("</table>");
        }

        html.push_str("<h2>Etapas</h2><table>");
        for stage in &self.stages {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&stage.name),
                escape(&stage.status),
                escape(&stage.detail)
            ));
        }
        html.push_str("</table>");

        if !self.findings.is_empty() {
            html.push_str("<h2>Hallazgos</h2><ul>");
            for finding in &self.findings {
                html.push_str(&format!("<li>{}</li>", escape(finding)));
            }
            html.push_str("</ul>");
        }
        if !self.recommendations.is_empty() {
            html.push_str("<h2>Recomendaciones</h2><ul>");
            for recommendation in &self.recommendations {
                html.push_str(&format!("<li>{}</li>", escape(recommendation)));
            }
            html.push_str("</ul>");
        }

        html.push_str("</body></html>");
        html
    }
}

fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "success",
        StageStatus::Degraded => "degraded",
        StageStatus::Failed => "failed",
        StageStatus::Skipped => "skipped",
    }
}

fn dimension_label(value: &DimensionValue) -> String {
    match value {
        DimensionValue::Number(n) => format!("{n:.1}"),
        DimensionValue::Label(l) => l.clone(),
        DimensionValue::Unavailable => "no disponible".to_string(),
    }
}

fn stage_detail(artifact: &AnalysisArtifact, name: crate::models::StageName) -> String {
    use crate::models::{StageData, StageName};
    match (name, artifact.stage(name).data.as_ref()) {
        (StageName::Extraction, Some(StageData::Extraction(stats))) => format!(
            "{} caracteres, {} páginas",
            stats.text_chars,
            stats
                .page_count
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        (StageName::Chunking, Some(StageData::Chunking(stats))) => format!(
            "{} fragmentos ({} caracteres), proveedor {}",
            stats.fragment_count,
            stats.total_chars,
            stats.provider_used.as_deref().unwrap_or("ninguno")
        ),
        (StageName::Classification, Some(StageData::Classification(result))) => format!(
            "{} fragmentos en {} secciones",
            result.fragments.len(),
            result.found_sections().len()
        ),
        (StageName::Validation, Some(StageData::Validation(record))) => record.summary.clone(),
        (StageName::Risk, Some(StageData::Risk(assessment))) => format!(
            "riesgo {} ({:.1})",
            assessment.overall_level.as_str(),
            assessment.total_score
        ),
        (StageName::Ruc, Some(StageData::Ruc(record))) => format!(
            "{} RUC, calificación {}",
            record.found.len(),
            record.bucket.as_str()
        ),
        _ => String::new(),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
