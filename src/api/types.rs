//! Request/response shapes for the ingress API.

use serde::{Deserialize, Serialize};

use crate::models::{AnalysisLevel, DocType};

/// Analysis depth as it appears on the wire; defaults to comprehensive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireAnalysisLevel {
    Basic,
    #[default]
    Comprehensive,
}

impl From<WireAnalysisLevel> for AnalysisLevel {
    fn from(level: WireAnalysisLevel) -> Self {
        match level {
            WireAnalysisLevel::Basic => AnalysisLevel::Basic,
            WireAnalysisLevel::Comprehensive => AnalysisLevel::Comprehensive,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content_base64: String,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub analysis_level: Option<WireAnalysisLevel>,
    #[serde(default)]
    pub force_rebuild: Option<bool>,
    /// Optional integrity check over the decoded bytes.
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub run_id: String,
    pub doc_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonUploadRequest {
    pub files: Vec<UploadRequest>,
    #[serde(default)]
    pub analysis_level: Option<WireAnalysisLevel>,
    #[serde(default)]
    pub force_rebuild: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonUploadResponse {
    pub comparison_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResponse {
    pub status: String,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Analysis,
    Comparison,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Html,
    Pdf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub report_type: ReportType,
    pub format: ReportFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_level_defaults_to_comprehensive() {
        let level: AnalysisLevel = WireAnalysisLevel::default().into();
        assert_eq!(level, AnalysisLevel::Comprehensive);
    }

    #[test]
    fn upload_request_parses_minimal_payload() {
        let request: UploadRequest =
            serde_json::from_str(r#"{"filename": "a.txt", "content_base64": "aG9sYQ=="}"#).unwrap();
        assert!(request.doc_type.is_none());
        assert!(request.sha256.is_none());
    }

    #[test]
    fn report_request_parses() {
        let request: ReportRequest =
            serde_json::from_str(r#"{"report_type": "comparison", "format": "html"}"#).unwrap();
        assert!(matches!(request.report_type, ReportType::Comparison));
        assert!(matches!(request.format, ReportFormat::Html));
    }
}
