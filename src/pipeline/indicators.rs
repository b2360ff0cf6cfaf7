//! Risk indicator banks and mitigation templates.
//!
//! Five fixed categories with constant weights. Each indicator is a
//! Spanish term with a severity between 1 and 3; mitigation templates
//! are selected by which indicators actually fired.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub term: String,
    pub severity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mitigation {
    pub template: String,
    /// Indicator terms that make this mitigation relevant. Empty means
    /// it applies whenever the category is elevated.
    #[serde(default)]
    pub trigger_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCategoryDef {
    pub key: String,
    pub description: String,
    pub weight: f32,
    pub indicators: Vec<Indicator>,
    /// Seed phrases for the category's embedding centroid.
    pub seeds: Vec<String>,
    pub mitigations: Vec<Mitigation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorBank {
    pub categories: Vec<RiskCategoryDef>,
}

fn ind(term: &str, severity: u8) -> Indicator {
    Indicator {
        term: term.to_string(),
        severity,
    }
}

fn mit(template: &str, triggers: &[&str]) -> Mitigation {
    Mitigation {
        template: template.to_string(),
        trigger_terms: triggers.iter().map(|t| t.to_string()).collect(),
    }
}

/// Terms that mark a high-band risk as critical when present in its top
/// contributing fragment (legal or monetary exposure).
pub const CRITICAL_CONTEXT_TERMS: &[&str] = &[
    "multa",
    "penalidad",
    "sanción",
    "incumplimiento",
    "demanda",
    "indemnización",
    "garantía",
    "usd",
    "$",
];

impl IndicatorBank {
    pub fn builtin() -> Self {
        let categories = vec![
            RiskCategoryDef {
                key: "technical".into(),
                description: "Riesgos relacionados con aspectos técnicos".into(),
                weight: 0.30,
                indicators: vec![
                    ind("tecnología no probada", 3),
                    ind("obsolescencia técnica", 3),
                    ind("especificaciones ambiguas", 2),
                    ind("compatibilidad dudosa", 2),
                    ind("falta de estándares", 2),
                    ind("dependencia tecnológica", 2),
                    ind("integración compleja", 2),
                    ind("complejidad técnica", 2),
                    ind("actualizaciones frecuentes", 1),
                    ind("riesgo técnico", 1),
                ],
                seeds: vec![
                    "riesgos técnicos del proyecto".into(),
                    "problemas de integración y compatibilidad".into(),
                    "tecnología sin antecedentes de uso".into(),
                ],
                mitigations: vec![
                    mit(
                        "Exigir pruebas de concepto antes de la adjudicación",
                        &["tecnología no probada", "compatibilidad dudosa"],
                    ),
                    mit(
                        "Definir especificaciones técnicas verificables con criterios de aceptación",
                        &["especificaciones ambiguas", "falta de estándares"],
                    ),
                    mit(
                        "Planificar la integración por fases con hitos de validación",
                        &["integración compleja", "complejidad técnica"],
                    ),
                ],
            },
            RiskCategoryDef {
                key: "economic".into(),
                description: "Riesgos financieros y económicos".into(),
                weight: 0.25,
                indicators: vec![
                    ind("precio excesivamente bajo", 3),
                    ind("costos ocultos", 3),
                    ind("flujo de caja negativo", 3),
                    ind("inflación no contemplada", 2),
                    ind("variación de precios", 2),
                    ind("garantías insuficientes", 2),
                    ind("penalidades excesivas", 2),
                    ind("moneda extranjera", 1),
                    ind("sobrecosto", 2),
                    ind("riesgo financiero", 1),
                ],
                seeds: vec![
                    "riesgos económicos y financieros".into(),
                    "sobrecostos y variaciones de precio".into(),
                    "solvencia financiera del oferente".into(),
                ],
                mitigations: vec![
                    mit(
                        "Solicitar desglose de precios y sustento de costos unitarios",
                        &["precio excesivamente bajo", "costos ocultos"],
                    ),
                    mit(
                        "Incluir fórmula de reajuste de precios en el contrato",
                        &["inflación no contemplada", "variación de precios"],
                    ),
                    mit(
                        "Reforzar garantías económicas y retenciones",
                        &["garantías insuficientes", "flujo de caja negativo"],
                    ),
                ],
            },
            RiskCategoryDef {
                key: "legal".into(),
                description: "Riesgos legales y regulatorios".into(),
                weight: 0.20,
                indicators: vec![
                    ind("incumplimiento legal", 3),
                    ind("conflicto de leyes", 3),
                    ind("normatividad cambiante", 2),
                    ind("regulación no clara", 2),
                    ind("licencias pendientes", 2),
                    ind("jurisdicción múltiple", 2),
                    ind("propiedad intelectual", 1),
                    ind("responsabilidad civil", 2),
                    ind("riesgo legal", 1),
                    ind("marco normativo", 1),
                ],
                seeds: vec![
                    "riesgos legales y regulatorios".into(),
                    "permisos y licencias pendientes".into(),
                    "responsabilidad contractual y civil".into(),
                ],
                mitigations: vec![
                    mit(
                        "Obtener dictamen jurídico sobre la normativa aplicable",
                        &["normatividad cambiante", "regulación no clara", "conflicto de leyes"],
                    ),
                    mit(
                        "Verificar licencias y permisos antes de la firma",
                        &["licencias pendientes"],
                    ),
                    mit(
                        "Pactar cláusulas de responsabilidad y resolución de controversias",
                        &["responsabilidad civil", "jurisdicción múltiple"],
                    ),
                ],
            },
            RiskCategoryDef {
                key: "operational".into(),
                description: "Riesgos operacionales y de ejecución".into(),
                weight: 0.15,
                indicators: vec![
                    ind("recursos insuficientes", 3),
                    ind("personal no calificado", 3),
                    ind("cronograma apretado", 2),
                    ind("dependencias externas", 2),
                    ind("coordinación compleja", 2),
                    ind("comunicación deficiente", 1),
                    ind("control de calidad", 1),
                    ind("gestión de cambios", 1),
                    ind("riesgo operacional", 1),
                    ind("problemas operativos", 1),
                ],
                seeds: vec![
                    "riesgos operativos de la ejecución".into(),
                    "capacidad del equipo y recursos disponibles".into(),
                    "cronograma y dependencias del proyecto".into(),
                ],
                mitigations: vec![
                    mit(
                        "Exigir nómina del personal clave con certificaciones",
                        &["personal no calificado", "recursos insuficientes"],
                    ),
                    mit(
                        "Revisar la holgura del cronograma y definir hitos de control",
                        &["cronograma apretado"],
                    ),
                    mit(
                        "Establecer plan de gestión de dependencias y comunicaciones",
                        &["dependencias externas", "coordinación compleja"],
                    ),
                ],
            },
            RiskCategoryDef {
                key: "supplier".into(),
                description: "Riesgos relacionados con proveedores".into(),
                weight: 0.10,
                indicators: vec![
                    ind("proveedor único", 3),
                    ind("estabilidad financiera dudosa", 3),
                    ind("experiencia limitada", 2),
                    ind("referencias negativas", 2),
                    ind("sanciones internacionales", 3),
                    ind("zona de conflicto", 2),
                    ind("ubicación remota", 1),
                    ind("idioma diferente", 1),
                    ind("riesgo proveedor", 1),
                    ind("confiabilidad dudosa", 2),
                ],
                seeds: vec![
                    "riesgos del proveedor y su cadena de suministro".into(),
                    "experiencia y referencias del contratista".into(),
                    "solvencia y reputación del oferente".into(),
                ],
                mitigations: vec![
                    mit(
                        "Identificar proveedores alternativos y planes de contingencia",
                        &["proveedor único"],
                    ),
                    mit(
                        "Solicitar referencias verificables y certificados de experiencia",
                        &["experiencia limitada", "referencias negativas"],
                    ),
                    mit(
                        "Evaluar estados financieros auditados del oferente",
                        &["estabilidad financiera dudosa"],
                    ),
                ],
            },
        ];

        Self { categories }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let bank: IndicatorBank = serde_json::from_str(&raw)?;
        bank.validate()?;
        Ok(bank)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("indicator bank has no categories".into()));
        }
        for category in &self.categories {
            if category.weight <= 0.0 || category.weight > 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' weight {} out of (0, 1]",
                    category.key, category.weight
                )));
            }
            for indicator in &category.indicators {
                if !(1..=3).contains(&indicator.severity) {
                    return Err(ConfigError::Invalid(format!(
                        "indicator '{}' severity {} out of [1, 3]",
                        indicator.term, indicator.severity
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RiskCategoryDef> {
        self.categories.iter().find(|c| c.key == key)
    }
}
