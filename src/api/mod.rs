//! HTTP ingress adapter.
//!
//! Thin JSON-over-HTTP surface for the analysis core. Uploads carry the
//! artifact as base64; analysis runs execute on background threads and
//! clients poll the status endpoints. The adapter owns no analysis
//! logic — it validates input, hands requests to the runner, and maps
//! core errors onto HTTP statuses.

pub mod error;
pub mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use sha2::Digest;

use crate::models::{comparison_id, run_id};
use crate::pipeline::orchestrator::{AnalysisRunner, RunRequest};
use crate::pipeline::report::ReportBundle;
use error::ApiError;
use types::*;

/// Comparison jobs tracked while their background thread works.
#[derive(Debug, Clone)]
enum JobState {
    Processing,
    Failed(String),
}

pub struct AppState {
    runner: Arc<AnalysisRunner>,
    uploads_dir: PathBuf,
    /// doc_id → run_id for runs launched through this surface.
    runs: Mutex<BTreeMap<String, String>>,
    comparison_jobs: Mutex<BTreeMap<String, JobState>>,
}

impl AppState {
    pub fn new(runner: Arc<AnalysisRunner>) -> Self {
        let uploads_dir = runner.context().config.data_root.join("uploads");
        Self {
            runner,
            uploads_dir,
            runs: Mutex::new(BTreeMap::new()),
            comparison_jobs: Mutex::new(BTreeMap::new()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analysis/upload", post(upload_analysis))
        .route("/analysis/{doc_id}", get(get_analysis))
        .route("/comparison/upload-multiple", post(upload_comparison))
        .route("/comparison/{comparison_id}", get(get_comparison))
        .route("/reports/{id}", post(build_report))
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API listening");
    axum::serve(listener, router(state)).await
}

// ── Handlers ───────────────────────────────────────────────

async fn upload_analysis(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let staged = stage_upload(&state, &payload)?;

    let request = RunRequest {
        path: staged,
        declared_type: payload.doc_type,
        level: payload.analysis_level.unwrap_or_default().into(),
        force_rebuild: payload.force_rebuild.unwrap_or(false),
    };

    // Input problems (unsupported format, empty document) surface now,
    // before any run is registered.
    let runner = state.runner.clone();
    let probe = request.clone();
    let (document, _text) =
        tokio::task::spawn_blocking(move || runner.ingest(&probe))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))??;

    let this_run = run_id(&document.doc_id, request.level);
    if let Ok(mut runs) = state.runs.lock() {
        runs.insert(document.doc_id.clone(), this_run.clone());
    }

    let runner = state.runner.clone();
    let background = request.clone();
    let spawned_run = this_run.clone();
    std::thread::spawn(move || {
        if let Err(e) = runner.run(&background) {
            tracing::error!(run_id = %spawned_run, error = %e, "Background analysis failed");
        }
    });

    Ok(Json(UploadResponse {
        run_id: this_run,
        doc_id: document.doc_id,
        status: "processing".to_string(),
    }))
}

async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
) -> Result<Response, ApiError> {
    // A live run for this document wins over any stored artifact.
    let tracked_run = state
        .runs
        .lock()
        .ok()
        .and_then(|runs| runs.get(&doc_id).cloned());

    if let Some(run) = tracked_run {
        if let Ok(status) = state.runner.status(&run) {
            if status.running {
                return Ok(Json(ProcessingResponse {
                    status: "processing".to_string(),
                    progress: status.progress,
                    stage: Some(status.stage.as_str().to_string()),
                })
                .into_response());
            }
        }
    }

    let artifact = state
        .runner
        .store()
        .latest_artifact_for_doc(&doc_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("no analysis for document {doc_id}")))?;
    Ok(Json(artifact).into_response())
}

async fn upload_comparison(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ComparisonUploadRequest>,
) -> Result<Json<ComparisonUploadResponse>, ApiError> {
    if payload.files.len() < 2 {
        return Err(ApiError::bad_request(
            "comparison requires at least two files".to_string(),
        ));
    }

    let level = payload.analysis_level.unwrap_or_default().into();
    let mut requests = Vec::with_capacity(payload.files.len());
    let mut doc_ids = Vec::with_capacity(payload.files.len());

    for file in &payload.files {
        let staged = stage_upload(&state, file)?;
        let request = RunRequest {
            path: staged,
            declared_type: file.doc_type,
            level,
            force_rebuild: payload.force_rebuild.unwrap_or(false),
        };
        let runner = state.runner.clone();
        let probe = request.clone();
        let (document, _) = tokio::task::spawn_blocking(move || runner.ingest(&probe))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))??;
        doc_ids.push(document.doc_id);
        requests.push(request);
    }

    let id = comparison_id(&doc_ids);
    if let Ok(mut jobs) = state.comparison_jobs.lock() {
        jobs.insert(id.clone(), JobState::Processing);
    }

    let runner = state.runner.clone();
    let job_id = id.clone();
    let jobs_handle = state.clone();
    std::thread::spawn(move || {
        let outcome = runner.compare(&requests);
        if let Ok(mut jobs) = jobs_handle.comparison_jobs.lock() {
            match outcome {
                Ok(_) => {
                    jobs.remove(&job_id);
                }
                Err(e) => {
                    tracing::error!(comparison_id = %job_id, error = %e, "Background comparison failed");
                    jobs.insert(job_id.clone(), JobState::Failed(e.to_string()));
                }
            }
        }
    });

    Ok(Json(ComparisonUploadResponse {
        comparison_id: id,
        status: "processing".to_string(),
    }))
}

async fn get_comparison(
    State(state): State<Arc<AppState>>,
    Path(comparison_id): Path<String>,
) -> Result<Response, ApiError> {
    if let Some(comparison) = state
        .runner
        .store()
        .load_comparison(&comparison_id)
        .map_err(ApiError::from)?
    {
        return Ok(Json(comparison).into_response());
    }

    let job = state
        .comparison_jobs
        .lock()
        .ok()
        .and_then(|jobs| jobs.get(&comparison_id).cloned());
    match job {
        Some(JobState::Processing) => Ok(Json(ProcessingResponse {
            status: "processing".to_string(),
            progress: 0.0,
            stage: None,
        })
        .into_response()),
        Some(JobState::Failed(reason)) => Err(ApiError::internal(reason)),
        None => Err(ApiError::not_found(format!(
            "no comparison {comparison_id}"
        ))),
    }
}

async fn build_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReportRequest>,
) -> Result<Response, ApiError> {
    let bundle = match payload.report_type {
        ReportType::Analysis => {
            let artifact = state
                .runner
                .store()
                .load_artifact(&id)
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::not_found(format!("no artifact {id}")))?;
            ReportBundle::from_artifact(&artifact)
        }
        ReportType::Comparison => {
            let comparison = state
                .runner
                .store()
                .load_comparison(&id)
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::not_found(format!("no comparison {id}")))?;
            ReportBundle::from_comparison(&comparison)
        }
    };

    match payload.format {
        ReportFormat::Json => {
            let body = bundle
                .to_json()
                .map_err(|e| ApiError::internal(e.to_string()))?;
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        ReportFormat::Html => Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bundle.to_html(),
        )
            .into_response()),
        ReportFormat::Pdf => Err(ApiError::unsupported(
            "PDF rendering is performed by an external renderer".to_string(),
        )),
    }
}

// ── Upload staging ─────────────────────────────────────────

/// Decode and stage an uploaded file, verifying the declared checksum.
fn stage_upload(state: &AppState, upload: &UploadRequest) -> Result<PathBuf, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&upload.content_base64)
        .map_err(|e| ApiError::bad_request(format!("invalid base64 payload: {e}")))?;

    if let Some(declared) = &upload.sha256 {
        let digest = sha2::Sha256::digest(&bytes);
        let mut hex = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        if !hex.eq_ignore_ascii_case(declared) {
            return Err(ApiError::bad_request(format!(
                "checksum mismatch: expected {declared}, got {hex}"
            )));
        }
    }

    let file_name = sanitize_filename(&upload.filename)?;
    std::fs::create_dir_all(&state.uploads_dir)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let path = state
        .uploads_dir
        .join(format!("{}-{file_name}", uuid::Uuid::new_v4()));
    std::fs::write(&path, bytes).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(path)
}

fn sanitize_filename(name: &str) -> Result<String, ApiError> {
    let base = std::path::Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if base.is_empty() {
        return Err(ApiError::bad_request("filename is required".to_string()));
    }
    Ok(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::pipeline::context::AnalysisContext;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let mut config = AnalysisConfig::default();
        config.data_root = dir.to_path_buf();
        let ctx = AnalysisContext::from_config(config).unwrap();
        Arc::new(AppState::new(Arc::new(AnalysisRunner::new(ctx))))
    }

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
    }

    async fn post_json(router: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn upload_returns_run_and_doc_ids() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = serde_json::json!({
            "filename": "propuesta.txt",
            "content_base64": encode("PROPUESTA TÉCNICA. Objeto de la contratación: obra civil."),
            "analysis_level": "basic"
        });

        let (status, value) = post_json(router(state), "/analysis/upload", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "processing");
        assert!(value["doc_id"].as_str().unwrap().len() == 64);
        assert!(value["run_id"].as_str().unwrap().ends_with("-basic"));
    }

    #[tokio::test]
    async fn upload_rejects_bad_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = serde_json::json!({
            "filename": "doc.txt",
            "content_base64": encode("contenido"),
            "sha256": "00".repeat(32)
        });

        let (status, value) = post_json(router(state), "/analysis/upload", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["error"].as_str().unwrap().contains("checksum"));
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = serde_json::json!({
            "filename": "datos.bin",
            "content_base64": encode("contenido")
        });

        let (status, _) = post_json(router(state), "/analysis/upload", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_analysis_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let response = router(state)
            .oneshot(Request::get("/analysis/unknown-doc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_comparison_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let response = router(state)
            .oneshot(Request::get("/comparison/deadbeef").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn comparison_needs_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = serde_json::json!({
            "files": [{
                "filename": "solo.txt",
                "content_base64": encode("un documento")
            }]
        });

        let (status, _) = post_json(router(state), "/comparison/upload-multiple", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pdf_report_is_not_served_by_core() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        // Persist a minimal artifact to report on.
        let artifact = crate::models::AnalysisArtifact::new(
            "run-x",
            "doc-x",
            crate::models::AnalysisLevel::Basic,
            chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        state.runner.store().save_artifact(&artifact).unwrap();

        let body = serde_json::json!({"report_type": "analysis", "format": "pdf"});
        let (status, _) = post_json(router(state), "/reports/run-x", body).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn json_report_for_stored_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let artifact = crate::models::AnalysisArtifact::new(
            "run-y",
            "doc-y",
            crate::models::AnalysisLevel::Basic,
            chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        state.runner.store().save_artifact(&artifact).unwrap();

        let body = serde_json::json!({"report_type": "analysis", "format": "json"});
        let (status, value) = post_json(router(state), "/reports/run-y", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["subject_id"], "run-y");
    }
}
