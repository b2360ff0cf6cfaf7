//! The fixed 9-section taxonomy for tender documents.
//!
//! The section set is closed: classifiers, validators and the
//! comparison engine all key on it. Editing the set is a schema bump,
//! and loading a table with a different section count or version fails
//! configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const TAXONOMY_SCHEMA_VERSION: u32 = 1;
pub const SECTION_COUNT: usize = 9;

/// One taxonomy row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDef {
    pub key: String,
    pub description: String,
    /// Lower number = more load-bearing for structural validation.
    pub priority: u32,
    /// Seed keywords: drive the keyword pre-score and the section
    /// centroid embeddings.
    pub keywords: Vec<String>,
    /// Regexes that pull key requirements out of the section's text.
    #[serde(default)]
    pub requirement_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    pub schema_version: u32,
    pub sections: Vec<SectionDef>,
}

impl Taxonomy {
    /// The built-in table for Ecuadorian public-works tender documents.
    pub fn builtin() -> Self {
        let sections = vec![
            SectionDef {
                key: "convocatoria".into(),
                description: "Convocatoria e identificación del proceso".into(),
                priority: 1,
                keywords: vec![
                    "convocatoria".into(),
                    "invitación".into(),
                    "llamado a licitación".into(),
                    "proceso de contratación".into(),
                    "entidad contratante".into(),
                    "código del proceso".into(),
                ],
                requirement_patterns: vec![
                    r"entidad\s+contratante[^.]{0,120}".into(),
                    r"c[óo]digo\s+del?\s+proceso[^.]{0,60}".into(),
                ],
            },
            SectionDef {
                key: "objeto".into(),
                description: "Objeto y alcance de la contratación".into(),
                priority: 1,
                keywords: vec![
                    "objeto de la contratación".into(),
                    "objeto".into(),
                    "alcance".into(),
                    "finalidad".into(),
                    "descripción del proyecto".into(),
                ],
                requirement_patterns: vec![
                    r"objeto\s+de\s+la\s+contrataci[óo]n[^.]{0,160}".into(),
                    r"alcance[^.]{0,160}".into(),
                ],
            },
            SectionDef {
                key: "condiciones_generales".into(),
                description: "Condiciones generales y marco normativo".into(),
                priority: 2,
                keywords: vec![
                    "condiciones generales".into(),
                    "obligaciones de las partes".into(),
                    "normatividad vigente".into(),
                    "marco legal aplicable".into(),
                    "ley orgánica".into(),
                ],
                requirement_patterns: vec![
                    r"ley\s+\d+\s+de\s+\d{4}[^.]{0,80}".into(),
                    r"decreto\s+\d+[^.]{0,80}".into(),
                ],
            },
            SectionDef {
                key: "condiciones_particulares".into(),
                description: "Condiciones particulares y documentos habilitantes".into(),
                priority: 2,
                keywords: vec![
                    "condiciones particulares".into(),
                    "cláusulas especiales".into(),
                    "documentos habilitantes".into(),
                    "requisitos específicos".into(),
                ],
                requirement_patterns: vec![
                    r"deber[áa]\s+presentar[^.]{0,140}".into(),
                    r"documentos?\s+habilitantes?[^.]{0,140}".into(),
                ],
            },
            SectionDef {
                key: "requisitos_tecnicos".into(),
                description: "Requisitos y especificaciones técnicas".into(),
                priority: 1,
                keywords: vec![
                    "requisitos técnicos".into(),
                    "especificaciones técnicas".into(),
                    "normas de calidad".into(),
                    "certificaciones requeridas".into(),
                    "estándares internacionales".into(),
                    "metodología".into(),
                ],
                requirement_patterns: vec![
                    r"deber[áa]\s+cumplir[^.]{0,140}".into(),
                    r"se\s+requiere[^.]{0,140}".into(),
                    r"norma\s+(?:iso|inen|nte)\s*[\d.-]+[^.]{0,60}".into(),
                ],
            },
            SectionDef {
                key: "condiciones_economicas".into(),
                description: "Condiciones económicas y forma de pago".into(),
                priority: 1,
                keywords: vec![
                    "condiciones económicas".into(),
                    "propuesta económica".into(),
                    "forma de pago".into(),
                    "presupuesto referencial".into(),
                    "anticipo".into(),
                    "valor del contrato".into(),
                ],
                requirement_patterns: vec![
                    r"(?:valor|presupuesto)[^.]{0,80}(?:usd|\$)\s*[\d.,]+".into(),
                    r"anticipo[^.]{0,80}\d+\s*%".into(),
                    r"forma\s+de\s+pago[^.]{0,140}".into(),
                ],
            },
            SectionDef {
                key: "garantias".into(),
                description: "Garantías exigidas al contratista".into(),
                priority: 2,
                keywords: vec![
                    "garantías".into(),
                    "póliza de cumplimiento".into(),
                    "garantía de fiel cumplimiento".into(),
                    "buen uso del anticipo".into(),
                    "garantía técnica".into(),
                ],
                requirement_patterns: vec![
                    r"garant[íi]a[^.]{0,100}\d+\s*%".into(),
                    r"p[óo]liza[^.]{0,120}".into(),
                ],
            },
            SectionDef {
                key: "plazos".into(),
                description: "Plazos, cronograma e hitos".into(),
                priority: 1,
                keywords: vec![
                    "plazos".into(),
                    "cronograma".into(),
                    "plazo de ejecución".into(),
                    "fechas de entrega".into(),
                    "hitos del proyecto".into(),
                ],
                requirement_patterns: vec![
                    r"plazo[^.]{0,80}\d+\s*(?:d[íi]as?|meses?|a[ñn]os?)".into(),
                    r"cronograma[^.]{0,140}".into(),
                ],
            },
            SectionDef {
                key: "formularios".into(),
                description: "Formularios y anexos de la oferta".into(),
                priority: 3,
                keywords: vec![
                    "formularios".into(),
                    "formulario único de la oferta".into(),
                    "anexos".into(),
                    "formato de presentación".into(),
                ],
                requirement_patterns: vec![r"formulario[^.]{0,120}".into()],
            },
        ];

        Self {
            schema_version: TAXONOMY_SCHEMA_VERSION,
            sections,
        }
    }

    /// Load a taxonomy override from disk. Section count and schema
    /// version are pinned; anything else is a configuration error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let taxonomy: Taxonomy = serde_json::from_str(&raw)?;
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != TAXONOMY_SCHEMA_VERSION {
            return Err(ConfigError::Invalid(format!(
                "taxonomy schema version {} not supported (expected {})",
                self.schema_version, TAXONOMY_SCHEMA_VERSION
            )));
        }
        if self.sections.len() != SECTION_COUNT {
            return Err(ConfigError::Invalid(format!(
                "taxonomy must define exactly {SECTION_COUNT} sections, found {}",
                self.sections.len()
            )));
        }
        for section in &self.sections {
            if section.keywords.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "section '{}' has no keywords",
                    section.key
                )));
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.key.clone()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&SectionDef> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Sections required for a fully structured document, highest
    /// priority first.
    pub fn required_sections(&self) -> Vec<String> {
        let mut sections: Vec<&SectionDef> = self.sections.iter().collect();
        sections.sort_by_key(|s| s.priority);
        sections.into_iter().map(|s| s.key.clone()).collect()
    }
}
