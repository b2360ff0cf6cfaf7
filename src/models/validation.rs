use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Final verdict bands used by contracting entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationLevel {
    #[serde(rename = "APROBADO")]
    Aprobado,
    #[serde(rename = "APROBADO_CON_OBSERVACIONES")]
    AprobadoConObservaciones,
    #[serde(rename = "RECHAZADO")]
    Rechazado,
}

impl ValidationLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            ValidationLevel::Aprobado
        } else if score >= 50.0 {
            ValidationLevel::AprobadoConObservaciones
        } else {
            ValidationLevel::Rechazado
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Aprobado => "APROBADO",
            ValidationLevel::AprobadoConObservaciones => "APROBADO_CON_OBSERVACIONES",
            ValidationLevel::Rechazado => "RECHAZADO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    Low,
    Medium,
    High,
}

impl ComplianceLevel {
    pub fn from_pct(pct: f32) -> Self {
        if pct >= 80.0 {
            ComplianceLevel::High
        } else if pct >= 50.0 {
            ComplianceLevel::Medium
        } else {
            ComplianceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceLevel::Low => "low",
            ComplianceLevel::Medium => "medium",
            ComplianceLevel::High => "high",
        }
    }
}

/// Structural sub-validation: which required sections the classifier
/// found, plus length and date presence checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralValidation {
    pub required_sections: Vec<String>,
    pub found_sections: Vec<String>,
    pub missing_sections: Vec<String>,
    pub completion_pct: f32,
    pub has_dates: bool,
    pub adequate_length: bool,
    pub total_chars: usize,
}

/// Per-category outcome of the compliance rule sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCompliance {
    pub rules_checked: usize,
    pub rules_passed: usize,
    pub pct: f32,
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceValidation {
    pub rules_checked: usize,
    pub rules_passed: usize,
    pub by_category: BTreeMap<String, CategoryCompliance>,
    pub overall_pct: f32,
    pub level: ComplianceLevel,
}

/// Date coherence sub-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateValidation {
    pub count: usize,
    pub deadlines: usize,
    pub samples: Vec<String>,
    pub issues: Vec<String>,
    pub has_adequate_dates: bool,
}

/// Complete validation verdict for one document. `overall_score` is a
/// pure function of the three sub-records: structural 40%, compliance
/// 40%, dates 20%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub doc_id: String,
    pub overall_score: f32,
    pub level: ValidationLevel,
    pub structural: StructuralValidation,
    pub compliance: ComplianceValidation,
    pub dates: DateValidation,
    pub recommendations: Vec<String>,
    pub summary: String,
}
