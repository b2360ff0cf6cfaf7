//! RUC validation agent.
//!
//! Extracts 13-digit contractor identifiers, verifies them against the
//! SRI check-digit algorithms (modulus-10 for natural persons,
//! modulus-11 for public entities and juridical persons), optionally
//! confirms activity with a registry adapter, and scores how well the
//! identified contractors fit the requested work type.

use regex::Regex;

use super::{AgentError, AnalysisAgent, StageInput, StageSignal};
use crate::models::{
    EntityKind, RucBucket, RucCandidate, RucRecord, StageData, StageName, WorkType,
};
use crate::pipeline::context::AnalysisContext;

/// Registry adapter contract (SRI or equivalent). Absent adapter means
/// candidates stay unverified, which degrades the score but never the
/// stage.
pub trait RucRegistry: Send + Sync {
    fn lookup(&self, ruc: &str) -> Result<Option<RegistryEntry>, String>;
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub active: bool,
    pub business_name: Option<String>,
    pub activity: Option<String>,
    pub ciiu_code: Option<String>,
    /// Declared qualifications (registros, certificaciones) as listed
    /// by the registry or the accompanying documentation.
    pub qualifications: Vec<String>,
}

/// Per-work-type compatibility bank: which economic activities, CIIU
/// code prefixes and qualifications count toward the requested work.
struct WorkTypeBank {
    compatible_activities: &'static [&'static str],
    ciiu_prefixes: &'static [&'static str],
    required_qualifications: &'static [&'static str],
}

const CONSTRUCCION_BANK: WorkTypeBank = WorkTypeBank {
    compatible_activities: &[
        "construcción",
        "edificación",
        "obra civil",
        "ingeniería civil",
        "arquitectura",
        "consultoría técnica",
        "supervisión de obras",
        "construcción de edificios",
        "obras de ingeniería civil",
        "actividades especializadas de construcción",
    ],
    ciiu_prefixes: &["F41", "F42", "F43", "M71", "M74"],
    required_qualifications: &[
        "registro de construcción",
        "certificación técnica",
        "personal técnico calificado",
        "experiencia en construcción",
    ],
};

const SERVICIOS_BANK: WorkTypeBank = WorkTypeBank {
    compatible_activities: &[
        "servicios profesionales",
        "consultoría",
        "asesoría técnica",
        "servicios de ingeniería",
        "servicios de arquitectura",
    ],
    ciiu_prefixes: &["M69", "M70", "M71", "M74"],
    required_qualifications: &[],
};

const SUMINISTROS_BANK: WorkTypeBank = WorkTypeBank {
    compatible_activities: &[
        "comercio al por mayor",
        "suministro de materiales",
        "venta de equipos",
        "importación",
        "distribución",
    ],
    ciiu_prefixes: &["G46", "G47", "C23", "C25"],
    required_qualifications: &[],
};

fn bank_for(work_type: WorkType) -> &'static WorkTypeBank {
    match work_type {
        WorkType::Construccion => &CONSTRUCCION_BANK,
        WorkType::Servicios => &SERVICIOS_BANK,
        WorkType::Suministros => &SUMINISTROS_BANK,
    }
}

/// Compatibility points per matching activity, CIIU prefix and
/// required qualification.
const POINTS_ACTIVITY: f32 = 20.0;
const POINTS_CIIU: f32 = 30.0;
const POINTS_QUALIFICATION: f32 = 25.0;

const WEIGHT_FORMAT: f32 = 40.0;
const WEIGHT_VERIFIED: f32 = 30.0;
const WEIGHT_COMPATIBLE: f32 = 30.0;

/// The agent scores candidates against the tender's work type;
/// CONSTRUCCION unless a host selects otherwise.
#[derive(Default)]
pub struct RucAgent {
    work_type: WorkType,
}

impl RucAgent {
    pub fn for_work_type(work_type: WorkType) -> Self {
        Self { work_type }
    }
}

impl AnalysisAgent for RucAgent {
    fn name(&self) -> StageName {
        StageName::Ruc
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
        let candidates = extract_candidates(input.text);
        signal.set_total(candidates.len().max(1));

        let mut found = Vec::with_capacity(candidates.len());
        for (done, (raw, normalized, context)) in candidates.into_iter().enumerate() {
            signal.checkpoint(done)?;

            let check = validate_checksum(&normalized);
            let mut candidate = RucCandidate {
                raw,
                normalized,
                checksum_valid: check.valid,
                entity_kind: check.entity_kind,
                verified: false,
                activity: None,
                compatibility_score: None,
                compatibility_level: None,
                context,
            };

            if candidate.checksum_valid {
                if let Some(registry) = &ctx.ruc_registry {
                    match registry.lookup(&candidate.normalized) {
                        Ok(Some(entry)) => {
                            candidate.verified = entry.active;
                            candidate.activity = entry.activity.clone();
                            let (score, level) = compatibility_of(&entry, bank_for(self.work_type));
                            candidate.compatibility_score = Some(score);
                            candidate.compatibility_level = Some(level.to_string());
                        }
                        Ok(None) => {
                            tracing::debug!(ruc = %candidate.normalized, "RUC not found in registry");
                        }
                        Err(e) => {
                            tracing::warn!(ruc = %candidate.normalized, error = %e, "Registry lookup failed, keeping candidate unverified");
                        }
                    }
                }
            }

            found.push(candidate);
        }
        signal.checkpoint(found.len().max(1))?;

        let (score, recommendations) = score_record(&found);
        let bucket = RucBucket::from_score(score);

        tracing::info!(
            doc_id = %input.document.doc_id,
            candidates = found.len(),
            score,
            bucket = bucket.as_str(),
            "RUC validation complete"
        );

        Ok(StageData::Ruc(RucRecord {
            doc_id: input.document.doc_id.clone(),
            found,
            score,
            bucket,
            recommendations,
        }))
    }
}

/// Pull 13-digit sequences (separators allowed) with surrounding context.
fn extract_candidates(text: &str) -> Vec<(String, String, String)> {
    let regex = Regex::new(r"\b\d(?:[ .\-]?\d){12}\b").expect("static regex");
    let mut seen = std::collections::BTreeSet::new();
    let mut candidates = Vec::new();

    for found in regex.find_iter(text) {
        let raw = found.as_str().to_string();
        let normalized: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if normalized.len() != 13 || !seen.insert(normalized.clone()) {
            continue;
        }
        let start = found.start().saturating_sub(80);
        let end = (found.end() + 80).min(text.len());
        let context = text[align_floor(text, start)..align_ceil(text, end)]
            .trim()
            .to_string();
        candidates.push((raw, normalized, context));
    }
    candidates
}

fn align_floor(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn align_ceil(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

pub struct ChecksumOutcome {
    pub valid: bool,
    pub entity_kind: Option<EntityKind>,
}

/// SRI check rules for a normalized 13-digit RUC.
///
/// Third digit selects the taxpayer class:
/// - 0–5 natural person: modulus-10 over digits 1–9 with coefficients
///   (2,1,2,1,2,1,2,1,2), doubled products reduced by 9, check at digit
///   10, establishment suffix exactly 001.
/// - 6 public entity: modulus-11 over digits 1–8 with weights
///   (3,2,7,6,5,4,3,2), check at digit 9, suffix exactly 0001.
/// - 9 juridical person: modulus-11 over digits 1–9 with weights
///   (4,3,2,7,6,5,4,3,2), check at digit 10, suffix 001–999.
pub fn validate_checksum(ruc: &str) -> ChecksumOutcome {
    let invalid = ChecksumOutcome {
        valid: false,
        entity_kind: None,
    };
    if ruc.len() != 13 || !ruc.chars().all(|c| c.is_ascii_digit()) {
        return invalid;
    }
    let digits: Vec<u32> = ruc.chars().map(|c| c.to_digit(10).unwrap_or(0)).collect();

    let province = digits[0] * 10 + digits[1];
    if !(1..=24).contains(&province) {
        return invalid;
    }

    match digits[2] {
        0..=5 => {
            let coefficients = [2u32, 1, 2, 1, 2, 1, 2, 1, 2];
            let mut total = 0u32;
            for (digit, coefficient) in digits.iter().take(9).zip(coefficients.iter()) {
                let mut product = digit * coefficient;
                if product >= 10 {
                    product -= 9;
                }
                total += product;
            }
            let expected = (10 - total % 10) % 10;
            let valid = digits[9] == expected && &ruc[10..] == "001";
            ChecksumOutcome {
                valid,
                entity_kind: Some(EntityKind::NaturalPerson),
            }
        }
        6 => {
            let weights = [3u32, 2, 7, 6, 5, 4, 3, 2];
            let total: u32 = digits
                .iter()
                .take(8)
                .zip(weights.iter())
                .map(|(d, w)| d * w)
                .sum();
            let remainder = total % 11;
            let expected = match remainder {
                0 => 0,
                1 => return invalid_with(EntityKind::PublicEntity),
                r => 11 - r,
            };
            let valid = digits[8] == expected && &ruc[9..] == "0001";
            ChecksumOutcome {
                valid,
                entity_kind: Some(EntityKind::PublicEntity),
            }
        }
        9 => {
            let weights = [4u32, 3, 2, 7, 6, 5, 4, 3, 2];
            let total: u32 = digits
                .iter()
                .take(9)
                .zip(weights.iter())
                .map(|(d, w)| d * w)
                .sum();
            let remainder = total % 11;
            let expected = match remainder {
                0 => 0,
                1 => return invalid_with(EntityKind::JuridicalPerson),
                r => 11 - r,
            };
            let suffix_ok = ruc[10..].parse::<u32>().map(|s| s >= 1).unwrap_or(false);
            let valid = digits[9] == expected && suffix_ok;
            ChecksumOutcome {
                valid,
                entity_kind: Some(EntityKind::JuridicalPerson),
            }
        }
        _ => invalid,
    }
}

fn invalid_with(kind: EntityKind) -> ChecksumOutcome {
    ChecksumOutcome {
        valid: false,
        entity_kind: Some(kind),
    }
}

/// Compatibility of a registry entry with the requested work type:
/// points per matching activity, CIIU prefix and required
/// qualification, banded ALTA ≥ 70 / MEDIA ≥ 40 / BAJA.
fn compatibility_of(entry: &RegistryEntry, bank: &WorkTypeBank) -> (f32, &'static str) {
    let mut score = 0.0f32;
    if let Some(activity) = &entry.activity {
        let lower = activity.to_lowercase();
        for compatible in bank.compatible_activities {
            if lower.contains(compatible) {
                score += POINTS_ACTIVITY;
            }
        }
    }
    if let Some(ciiu) = &entry.ciiu_code {
        for prefix in bank.ciiu_prefixes {
            if ciiu.starts_with(prefix) {
                score += POINTS_CIIU;
            }
        }
    }
    for required in bank.required_qualifications {
        let held = entry
            .qualifications
            .iter()
            .any(|q| q.to_lowercase().contains(required));
        if held {
            score += POINTS_QUALIFICATION;
        }
    }
    let score = score.min(100.0);
    let level = if score >= 70.0 {
        "ALTA"
    } else if score >= 40.0 {
        "MEDIA"
    } else {
        "BAJA"
    };
    (score, level)
}

/// Blend: format validity 40%, registry verification 30%, activity
/// compatibility 30%, each as the fraction of candidates that qualify.
fn score_record(found: &[RucCandidate]) -> (f32, Vec<String>) {
    let mut recommendations = Vec::new();

    if found.is_empty() {
        recommendations
            .push("Solicitar documentación que contenga el RUC del contratista".to_string());
        return (0.0, recommendations);
    }

    let total = found.len() as f32;
    let valid = found.iter().filter(|c| c.checksum_valid).count() as f32;
    let verified = found.iter().filter(|c| c.verified).count() as f32;
    let compatible = found
        .iter()
        .filter(|c| c.compatibility_score.unwrap_or(0.0) >= 40.0)
        .count() as f32;

    let score = WEIGHT_FORMAT * (valid / total)
        + WEIGHT_VERIFIED * (verified / total)
        + WEIGHT_COMPATIBLE * (compatible / total);

    if valid < total {
        recommendations.push("Verificar el formato de los números de RUC señalados".to_string());
    }
    if verified < valid {
        recommendations
            .push("Realizar verificación manual en los portales oficiales del SRI".to_string());
    }
    if compatible < verified {
        recommendations.push(
            "Evaluar la compatibilidad de la actividad económica con el trabajo solicitado"
                .to_string(),
        );
    }

    ((score * 100.0).round() / 100.0, recommendations)
}
