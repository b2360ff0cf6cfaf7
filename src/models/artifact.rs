use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::classification::ClassificationResult;
use super::document::{AnalysisLevel, DocType};
use super::risk::RiskAssessment;
use super::ruc::RucRecord;
use super::validation::ValidationRecord;

/// Stages of the analysis state machine, in execution order.
/// Validation, Risk and Ruc run concurrently after Classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Extraction,
    Chunking,
    Classification,
    Validation,
    Risk,
    Ruc,
    Aggregation,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        StageName::Extraction,
        StageName::Chunking,
        StageName::Classification,
        StageName::Validation,
        StageName::Risk,
        StageName::Ruc,
        StageName::Aggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Extraction => "extraction",
            StageName::Chunking => "chunking",
            StageName::Classification => "classification",
            StageName::Validation => "validation",
            StageName::Risk => "risk",
            StageName::Ruc => "ruc",
            StageName::Aggregation => "aggregation",
        }
    }

    /// Whether a failure here still allows a partial-success run.
    /// Everything downstream of classification is non-critical.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StageName::Extraction | StageName::Chunking | StageName::Classification
        )
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Degraded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::PartialSuccess => "partial_success",
            OverallStatus::Failed => "failed",
        }
    }
}

/// Summary emitted by the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub text_chars: usize,
    pub page_count: Option<usize>,
    pub table_count: Option<usize>,
    pub detected_type: DocType,
}

/// Summary emitted by the chunking stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingStats {
    pub fragment_count: usize,
    pub total_chars: usize,
    pub embedded: bool,
    /// Which embedding provider actually served the run, when any did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
}

/// Tagged payload of a completed stage. Downstream consumers (comparison,
/// report assembly) match on the variant instead of poking at loose maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageData {
    Extraction(ExtractionStats),
    Chunking(ChunkingStats),
    Classification(ClassificationResult),
    Validation(ValidationRecord),
    Risk(RiskAssessment),
    Ruc(RucRecord),
}

/// Outcome of one stage. Never absent from an artifact: stages that did
/// not run carry `Skipped`, so status readers always see a full map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StageData>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageResult {
    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            data: None,
            errors: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// Persisted record of one pipeline run. Written stage by stage; the
/// overall status is settled during aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub run_id: String,
    pub doc_id: String,
    pub analysis_level: AnalysisLevel,
    /// Date captured at run start; deadline checks compare against this
    /// so re-running on stored inputs reproduces the record.
    pub reference_date: NaiveDate,
    pub stage_results: BTreeMap<StageName, StageResult>,
    pub overall_status: OverallStatus,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisArtifact {
    /// Fresh artifact with every stage marked skipped.
    pub fn new(run_id: &str, doc_id: &str, level: AnalysisLevel, reference_date: NaiveDate) -> Self {
        let now = Utc::now();
        let stage_results = StageName::ALL
            .iter()
            .map(|stage| (*stage, StageResult::skipped()))
            .collect();
        Self {
            run_id: run_id.to_string(),
            doc_id: doc_id.to_string(),
            analysis_level: level,
            reference_date,
            stage_results,
            overall_status: OverallStatus::Failed,
            key_findings: Vec::new(),
            recommendations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, name: StageName) -> &StageResult {
        // The map is seeded with all stages at construction; records
        // deserialized from older layouts fall back to skipped.
        static SKIPPED: StageResult = StageResult {
            status: StageStatus::Skipped,
            data: None,
            errors: Vec::new(),
            started_at: None,
            ended_at: None,
        };
        self.stage_results.get(&name).unwrap_or(&SKIPPED)
    }

    pub fn stage_succeeded(&self, name: StageName) -> bool {
        matches!(
            self.stage(name).status,
            StageStatus::Success | StageStatus::Degraded
        )
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        match self.stage(StageName::Classification).data.as_ref() {
            Some(StageData::Classification(result)) => Some(result),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationRecord> {
        match self.stage(StageName::Validation).data.as_ref() {
            Some(StageData::Validation(record)) => Some(record),
            _ => None,
        }
    }

    pub fn risk(&self) -> Option<&RiskAssessment> {
        match self.stage(StageName::Risk).data.as_ref() {
            Some(StageData::Risk(assessment)) => Some(assessment),
            _ => None,
        }
    }

    pub fn ruc(&self) -> Option<&RucRecord> {
        match self.stage(StageName::Ruc).data.as_ref() {
            Some(StageData::Ruc(record)) => Some(record),
            _ => None,
        }
    }
}
