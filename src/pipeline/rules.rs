//! Compliance rule sets and the remediation table.
//!
//! Rules are data, not code: each is a predicate (regex, keyword set or
//! section presence) tagged with a category. The validator sweeps the
//! rule set for the document's type and scores per category.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::models::DocType;

/// Predicate forms a rule can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Case-insensitive regex over the full text.
    Regex(String),
    /// Any of the keywords present (case-insensitive).
    Keywords(Vec<String>),
    /// A taxonomy section was found by the classifier.
    SectionPresence(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub name: String,
    pub category: String,
    pub predicate: RulePredicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSets {
    rule_sets: BTreeMap<String, Vec<ComplianceRule>>,
}

fn regex_rule(name: &str, category: &str, pattern: &str) -> ComplianceRule {
    ComplianceRule {
        name: name.to_string(),
        category: category.to_string(),
        predicate: RulePredicate::Regex(pattern.to_string()),
    }
}

fn keyword_rule(name: &str, category: &str, keywords: &[&str]) -> ComplianceRule {
    ComplianceRule {
        name: name.to_string(),
        category: category.to_string(),
        predicate: RulePredicate::Keywords(keywords.iter().map(|k| k.to_string()).collect()),
    }
}

fn section_rule(name: &str, category: &str, section: &str) -> ComplianceRule {
    ComplianceRule {
        name: name.to_string(),
        category: category.to_string(),
        predicate: RulePredicate::SectionPresence(section.to_string()),
    }
}

pub const CAT_DOCUMENTOS: &str = "DOCUMENTOS_OBLIGATORIOS";
pub const CAT_TECNICOS: &str = "REQUISITOS_TECNICOS";
pub const CAT_LEGALES: &str = "REQUISITOS_LEGALES";
pub const CAT_ECONOMICOS: &str = "REQUISITOS_ECONOMICOS";
pub const CAT_PLAZOS: &str = "PLAZOS_Y_CRONOGRAMAS";

impl RuleSets {
    pub fn builtin() -> Self {
        let common_documentos = vec![
            regex_rule(
                "certificado_existencia",
                CAT_DOCUMENTOS,
                r"certificado\s+de\s+existencia\s+y\s+representaci[óo]n\s+legal",
            ),
            regex_rule("ruc_empresa", CAT_DOCUMENTOS, r"ruc\s+de\s+la\s+empresa|\bruc\b"),
            regex_rule("estados_financieros", CAT_DOCUMENTOS, r"estados\s+financieros"),
            regex_rule("poliza_cumplimiento", CAT_DOCUMENTOS, r"p[óo]liza\s+de\s+cumplimiento"),
            regex_rule(
                "experiencia_especifica",
                CAT_DOCUMENTOS,
                r"experiencia\s+espec[íi]fica",
            ),
        ];
        let common_tecnicos = vec![
            regex_rule(
                "especificaciones_minimas",
                CAT_TECNICOS,
                r"especificaciones\s+t[ée]cnicas\s+m[íi]nimas|especificaciones\s+t[ée]cnicas",
            ),
            regex_rule("certificaciones", CAT_TECNICOS, r"certificaciones\s+requeridas"),
            regex_rule("normas_calidad", CAT_TECNICOS, r"normas\s+de\s+calidad"),
            keyword_rule(
                "estandares",
                CAT_TECNICOS,
                &["estándares internacionales", "norma iso", "norma inen"],
            ),
            section_rule("seccion_tecnica", CAT_TECNICOS, "requisitos_tecnicos"),
        ];
        let common_legales = vec![
            regex_rule("ley_referencia", CAT_LEGALES, r"ley\s+\d+\s+de\s+\d{4}|ley\s+org[áa]nica"),
            regex_rule("decreto", CAT_LEGALES, r"decreto\s+\d+"),
            regex_rule("resolucion", CAT_LEGALES, r"resoluci[óo]n\s+\d+"),
            regex_rule("normatividad", CAT_LEGALES, r"normatividad\s+vigente"),
            regex_rule("marco_legal", CAT_LEGALES, r"marco\s+legal\s+aplicable"),
        ];
        let common_economicos = vec![
            regex_rule("valor_contrato", CAT_ECONOMICOS, r"valor\s+del\s+contrato"),
            regex_rule("forma_pago", CAT_ECONOMICOS, r"forma\s+de\s+pago"),
            regex_rule("anticipo", CAT_ECONOMICOS, r"anticipo"),
            regex_rule("garantias_economicas", CAT_ECONOMICOS, r"garant[íi]as?\s+econ[óo]micas?"),
            section_rule("seccion_economica", CAT_ECONOMICOS, "condiciones_economicas"),
        ];
        let common_plazos = vec![
            regex_rule("plazo_ejecucion", CAT_PLAZOS, r"plazo\s+de\s+ejecuci[óo]n"),
            regex_rule("cronograma", CAT_PLAZOS, r"cronograma\s+de\s+actividades|cronograma"),
            regex_rule("fechas_entrega", CAT_PLAZOS, r"fechas?\s+de\s+entrega"),
            regex_rule("penalidades", CAT_PLAZOS, r"penalidades?\s+por\s+retraso|multas?"),
            section_rule("seccion_plazos", CAT_PLAZOS, "plazos"),
        ];

        let mut base = Vec::new();
        base.extend(common_documentos);
        base.extend(common_tecnicos);
        base.extend(common_legales);
        base.extend(common_economicos);
        base.extend(common_plazos);

        // Proposals additionally have to carry the offer-side documents.
        let mut proposal = base.clone();
        proposal.push(regex_rule(
            "propuesta_tecnica",
            CAT_DOCUMENTOS,
            r"propuesta\s+t[ée]cnica",
        ));
        proposal.push(regex_rule(
            "propuesta_economica",
            CAT_DOCUMENTOS,
            r"propuesta\s+econ[óo]mica",
        ));
        proposal.push(keyword_rule(
            "plan_trabajo",
            CAT_PLAZOS,
            &["plan de trabajo", "entregables"],
        ));

        let mut contract = base.clone();
        contract.push(regex_rule(
            "clausula_terminacion",
            CAT_LEGALES,
            r"terminaci[óo]n\s+(?:anticipada|unilateral)",
        ));
        contract.push(regex_rule(
            "responsabilidad_civil",
            CAT_LEGALES,
            r"responsabilidad\s+civil",
        ));

        let mut rule_sets = BTreeMap::new();
        rule_sets.insert(DocType::Rfp.as_str().to_string(), base.clone());
        rule_sets.insert(DocType::Proposal.as_str().to_string(), proposal);
        rule_sets.insert(DocType::Contract.as_str().to_string(), contract);
        rule_sets.insert(DocType::Unknown.as_str().to_string(), base);

        Self { rule_sets }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let sets: RuleSets = serde_json::from_str(&raw)?;
        sets.validate()?;
        Ok(sets)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (doc_type, rules) in &self.rule_sets {
            if rules.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule set for '{doc_type}' is empty"
                )));
            }
            for rule in rules {
                if let RulePredicate::Regex(pattern) = &rule.predicate {
                    regex::Regex::new(&format!("(?i){pattern}")).map_err(|e| {
                        ConfigError::Invalid(format!("rule '{}': bad regex: {e}", rule.name))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Rules applicable to a document type; unknown types fall back to
    /// the base RFP set.
    pub fn for_type(&self, doc_type: DocType) -> &[ComplianceRule] {
        self.rule_sets
            .get(doc_type.as_str())
            .or_else(|| self.rule_sets.get(DocType::Rfp.as_str()))
            .map(|rules| rules.as_slice())
            .unwrap_or(&[])
    }
}

// ── Remediation table ──────────────────────────────────────

/// Canned remediation text for a failing compliance category.
pub fn category_remediation(category: &str) -> Option<&'static str> {
    match category {
        CAT_DOCUMENTOS => Some("Adjuntar los documentos obligatorios faltantes (certificados, pólizas, estados financieros)"),
        CAT_TECNICOS => Some("Detallar las especificaciones técnicas y certificaciones exigidas"),
        CAT_LEGALES => Some("Referenciar la normatividad vigente y el marco legal aplicable"),
        CAT_ECONOMICOS => Some("Precisar el valor del contrato, la forma de pago y las garantías económicas"),
        CAT_PLAZOS => Some("Definir el plazo de ejecución y el cronograma de actividades"),
        _ => None,
    }
}

/// Remediation for a structurally missing taxonomy section.
pub fn section_remediation(section: &str) -> String {
    format!("Completar la sección faltante: {section}")
}

pub const REMEDIATION_SHORT_DOCUMENT: &str =
    "Ampliar el contenido del documento con más detalles";
pub const REMEDIATION_FEW_DATES: &str = "Incluir más fechas y plazos específicos";
pub const REMEDIATION_DATE_ISSUES: &str =
    "Revisar y corregir las fechas identificadas como problemáticas";
