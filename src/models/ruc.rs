use serde::{Deserialize, Serialize};

/// Quality band of the contractor-identification evidence in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RucBucket {
    #[serde(rename = "EXCELENTE")]
    Excelente,
    #[serde(rename = "BUENO")]
    Bueno,
    #[serde(rename = "DEFICIENTE")]
    Deficiente,
}

impl RucBucket {
    pub fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            RucBucket::Excelente
        } else if score >= 60.0 {
            RucBucket::Bueno
        } else {
            RucBucket::Deficiente
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RucBucket::Excelente => "EXCELENTE",
            RucBucket::Bueno => "BUENO",
            RucBucket::Deficiente => "DEFICIENTE",
        }
    }
}

/// Work type a tender asks contractors to perform. Selects which
/// activity bank the compatibility scoring runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkType {
    #[serde(rename = "CONSTRUCCION")]
    Construccion,
    #[serde(rename = "SERVICIOS")]
    Servicios,
    #[serde(rename = "SUMINISTROS")]
    Suministros,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Construccion => "CONSTRUCCION",
            WorkType::Servicios => "SERVICIOS",
            WorkType::Suministros => "SUMINISTROS",
        }
    }
}

impl Default for WorkType {
    fn default() -> Self {
        WorkType::Construccion
    }
}

/// Taxpayer class encoded in the third digit of an Ecuadorian RUC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    NaturalPerson,
    PublicEntity,
    JuridicalPerson,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::NaturalPerson => "natural_person",
            EntityKind::PublicEntity => "public_entity",
            EntityKind::JuridicalPerson => "juridical_person",
        }
    }
}

/// One RUC candidate found in the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RucCandidate {
    /// As it appeared in the document, separators included.
    pub raw: String,
    /// Digits only, 13 characters.
    pub normalized: String,
    pub checksum_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<EntityKind>,
    /// True only when a registry adapter confirmed the taxpayer is active.
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_level: Option<String>,
    /// Surrounding text, for reviewer context.
    pub context: String,
}

/// Contractor-identification verdict for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RucRecord {
    pub doc_id: String,
    pub found: Vec<RucCandidate>,
    /// Blend of format validity (40%), registry verification (30%) and
    /// activity compatibility (30%).
    pub score: f32,
    pub bucket: RucBucket,
    pub recommendations: Vec<String>,
}
