//! Analysis orchestrator.
//!
//! Drives one document through the stage state machine
//! (extraction → chunking → classification → {validation, risk, ruc} →
//! aggregation), persisting the artifact atomically after every stage so
//! a crashed run resumes from the last completed stage. The three
//! post-classification stages execute on a bounded worker pool; each
//! stage runs under a wall-clock budget and observes the run's cancel
//! signal between fragments.

pub mod findings;

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    fingerprint, run_id, AnalysisArtifact, AnalysisLevel, ChunkingStats, Comparison, DocType,
    Document, ExtractionStats, Fragment, OverallStatus, StageData, StageName, StageResult,
    StageStatus,
};
use crate::pipeline::agents::classifier::ClassificationAgent;
use crate::pipeline::agents::comparison::ComparisonEngine;
use crate::pipeline::agents::risk::RiskAgent;
use crate::pipeline::agents::ruc::RucAgent;
use crate::pipeline::agents::validator::ValidationAgent;
use crate::pipeline::agents::{
    AgentError, AnalysisAgent, CancelToken, StageInput, StageSignal,
};
use crate::pipeline::chunker::chunk_text;
use crate::pipeline::context::{AnalysisContext, FRAGMENT_COLLECTION};
use crate::pipeline::embedding::EmbeddingModel;
use crate::pipeline::extraction::{DocumentExtractor, ExtractionError};
use crate::pipeline::vectorstore::{VectorItem, VectorStoreError};
use crate::store::{ArtifactStore, StoreError};

/// Embedding batch size during chunking.
const EMBED_BATCH: usize = 32;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    Embedding(#[from] crate::pipeline::embedding::EmbeddingError),

    #[error("Critical stage {stage} failed: {reason}")]
    CriticalStage { stage: StageName, reason: String },

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("Comparison failed: {0}")]
    Comparison(String),
}

/// One analysis request as the ingress adapter hands it over.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub path: PathBuf,
    pub declared_type: Option<DocType>,
    pub level: AnalysisLevel,
    pub force_rebuild: bool,
}

/// Shape returned by the status API. Always well-formed: stages that
/// have not run report as skipped inside the artifact, never as holes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub stage: StageName,
    pub progress: f32,
    pub overall_status: OverallStatus,
    pub artifact_refs: Vec<String>,
    pub running: bool,
}

/// Live bookkeeping for a run in flight.
struct LiveRun {
    cancel: CancelToken,
    stage: Mutex<StageName>,
    signals: Mutex<BTreeMap<StageName, Arc<StageSignal>>>,
}

impl LiveRun {
    fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            stage: Mutex::new(StageName::Extraction),
            signals: Mutex::new(BTreeMap::new()),
        }
    }

    fn enter(&self, stage: StageName) {
        if let Ok(mut current) = self.stage.lock() {
            *current = stage;
        }
    }

    fn signal_for(&self, stage: StageName, deadline: Option<Instant>) -> Arc<StageSignal> {
        let signal = Arc::new(StageSignal::new(self.cancel.clone(), deadline));
        if let Ok(mut signals) = self.signals.lock() {
            signals.insert(stage, signal.clone());
        }
        signal
    }

    /// Mean completed-fragment ratio over the stages seen so far.
    fn progress(&self) -> f32 {
        let Ok(signals) = self.signals.lock() else {
            return 0.0;
        };
        if signals.is_empty() {
            return 0.0;
        }
        let sum: f32 = signals.values().map(|s| s.progress()).sum();
        sum / signals.len() as f32
    }
}

/// Removes the live entry when a run exits by any path.
struct LiveGuard<'a> {
    runner: &'a AnalysisRunner,
    run_id: String,
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut live) = self.runner.live.lock() {
            live.remove(&self.run_id);
        }
    }
}

pub struct AnalysisRunner {
    ctx: AnalysisContext,
    store: ArtifactStore,
    extractor: DocumentExtractor,
    live: Mutex<BTreeMap<String, Arc<LiveRun>>>,
}

impl AnalysisRunner {
    pub fn new(ctx: AnalysisContext) -> Self {
        let store = ArtifactStore::from_config(&ctx.config);
        Self {
            ctx,
            store,
            extractor: DocumentExtractor::new(),
            live: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: DocumentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Extract and fingerprint without starting a run. Input errors
    /// (unsupported artifact, empty document) surface here.
    pub fn ingest(&self, request: &RunRequest) -> Result<(Document, String), RunError> {
        let extracted = self.extractor.extract(&request.path)?;
        let detected = DocType::detect(&extracted.text);
        let declared = request.declared_type;
        let doc_id = fingerprint(&extracted.text, declared.unwrap_or(detected));
        let document = Document {
            doc_id: doc_id.clone(),
            path: request.path.clone(),
            declared_type: declared,
            detected_type: detected,
            created_at: Utc::now(),
        };
        Ok((document, extracted.text))
    }

    /// Execute (or resume) the full pipeline for one document.
    ///
    /// Stage-local and dependency failures surface inside the returned
    /// artifact; only fatal conditions (corrupted store, dimension
    /// mismatch) return an error with no artifact exposed.
    pub fn run(&self, request: &RunRequest) -> Result<AnalysisArtifact, RunError> {
        let extracted = self.extractor.extract(&request.path)?;
        let detected = DocType::detect(&extracted.text);
        let declared = request.declared_type;
        let doc_id = fingerprint(&extracted.text, declared.unwrap_or(detected));
        let this_run = run_id(&doc_id, request.level);

        // Cache policy: a finished successful run is returned as-is
        // unless a rebuild was forced; anything else resumes.
        let cached = if request.force_rebuild {
            None
        } else {
            self.store.load_artifact(&this_run)?
        };
        if let Some(existing) = &cached {
            if existing.overall_status == OverallStatus::Success {
                tracing::info!(run_id = %this_run, "Returning cached artifact");
                return Ok(existing.clone());
            }
        }

        let mut artifact = cached.unwrap_or_else(|| {
            AnalysisArtifact::new(&this_run, &doc_id, request.level, Utc::now().date_naive())
        });

        let document = Document {
            doc_id: doc_id.clone(),
            path: request.path.clone(),
            declared_type: declared,
            detected_type: detected,
            created_at: artifact.created_at,
        };

        let live = Arc::new(LiveRun::new());
        if let Ok(mut registry) = self.live.lock() {
            registry.insert(this_run.clone(), live.clone());
        }
        let _guard = LiveGuard {
            runner: self,
            run_id: this_run.clone(),
        };

        tracing::info!(run_id = %this_run, doc_id = %doc_id, level = %request.level, "Analysis run started");

        // ── EXTRACTING ─────────────────────────────────────
        live.enter(StageName::Extraction);
        let extraction_signal = live.signal_for(StageName::Extraction, None);
        extraction_signal.set_total(1);
        let started = Utc::now();
        let stats = ExtractionStats {
            text_chars: extracted.text.chars().count(),
            page_count: extracted.page_count,
            table_count: extracted.table_count,
            detected_type: detected,
        };
        let extraction_status = if extracted.degraded {
            StageStatus::Degraded
        } else {
            StageStatus::Success
        };
        let _ = extraction_signal.checkpoint(1);
        artifact.stage_results.insert(
            StageName::Extraction,
            StageResult {
                status: extraction_status,
                data: Some(StageData::Extraction(stats)),
                errors: if extracted.degraded {
                    vec!["Partial extraction: low text density and no OCR engine".to_string()]
                } else {
                    Vec::new()
                },
                started_at: Some(started),
                ended_at: Some(Utc::now()),
            },
        );
        self.persist(&mut artifact)?;

        // ── CHUNKING (chunk + embed + store vectors) ───────
        live.enter(StageName::Chunking);
        let deadline = self.stage_deadline();
        let chunk_signal = live.signal_for(StageName::Chunking, deadline);
        let started = Utc::now();
        let fragments = match self.chunk_and_embed(&doc_id, &this_run, &extracted.text, &chunk_signal)
        {
            Ok(fragments) => fragments,
            Err(e) => {
                return self.fail_critical(artifact, StageName::Chunking, started, e, &this_run);
            }
        };
        artifact.stage_results.insert(
            StageName::Chunking,
            StageResult {
                status: StageStatus::Success,
                data: Some(StageData::Chunking(ChunkingStats {
                    fragment_count: fragments.len(),
                    total_chars: fragments.iter().map(|f| f.text.len()).sum(),
                    embedded: true,
                    provider_used: self.ctx.embedder.provider_used(),
                })),
                errors: Vec::new(),
                started_at: Some(started),
                ended_at: Some(Utc::now()),
            },
        );
        self.persist(&mut artifact)?;

        // ── CLASSIFYING ────────────────────────────────────
        live.enter(StageName::Classification);
        if !artifact.stage_succeeded(StageName::Classification)
            || artifact.classification().is_none()
        {
            let signal = live.signal_for(StageName::Classification, self.stage_deadline());
            let input = StageInput {
                document: &document,
                run_id: &this_run,
                text: &extracted.text,
                fragments: &fragments,
                classification: None,
                reference_date: artifact.reference_date,
            };
            let started = Utc::now();
            match ClassificationAgent.run(&self.ctx, &input, &signal) {
                Ok(data) => {
                    artifact.stage_results.insert(
                        StageName::Classification,
                        StageResult {
                            status: StageStatus::Success,
                            data: Some(data),
                            errors: Vec::new(),
                            started_at: Some(started),
                            ended_at: Some(Utc::now()),
                        },
                    );
                }
                Err(e) => {
                    return self.fail_critical(
                        artifact,
                        StageName::Classification,
                        started,
                        e,
                        &this_run,
                    );
                }
            }
            self.persist(&mut artifact)?;
        } else {
            tracing::info!(run_id = %this_run, "Reusing cached classification result");
        }

        let classification = artifact
            .classification()
            .cloned()
            .ok_or_else(|| RunError::CriticalStage {
                stage: StageName::Classification,
                reason: "classification produced no data".to_string(),
            })?;

        // ── VALIDATING / RISK / RUC on the worker pool ─────
        let agents: Vec<Box<dyn AnalysisAgent>> = vec![
            Box::new(ValidationAgent),
            Box::new(RiskAgent),
            Box::new(RucAgent::default()),
        ];
        let pending: Vec<Box<dyn AnalysisAgent>> = agents
            .into_iter()
            .filter(|agent| {
                let cached = artifact.stage_succeeded(agent.name())
                    && artifact.stage(agent.name()).data.is_some();
                if cached {
                    tracing::info!(run_id = %this_run, stage = %agent.name(), "Reusing cached stage result");
                }
                !cached
            })
            .collect();

        if !pending.is_empty() {
            live.enter(StageName::Validation);
            let results = self.run_concurrent(
                &live,
                pending,
                &document,
                &this_run,
                &extracted.text,
                &fragments,
                &classification,
                artifact.reference_date,
            );
            for (stage, started, ended, outcome) in results {
                match outcome {
                    Ok(data) => {
                        artifact.stage_results.insert(
                            stage,
                            StageResult {
                                status: StageStatus::Success,
                                data: Some(data),
                                errors: Vec::new(),
                                started_at: Some(started),
                                ended_at: Some(ended),
                            },
                        );
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(run_id = %this_run, stage = %stage, error = %e, "Fatal error in stage");
                        return Err(fatal_to_run_error(e));
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %this_run, stage = %stage, error = %e, "Stage failed");
                        artifact.stage_results.insert(
                            stage,
                            StageResult {
                                status: StageStatus::Failed,
                                data: None,
                                errors: vec![e.to_string()],
                                started_at: Some(started),
                                ended_at: Some(ended),
                            },
                        );
                    }
                }
                self.persist(&mut artifact)?;
            }
        }

        // ── AGGREGATING ────────────────────────────────────
        live.enter(StageName::Aggregation);
        let started = Utc::now();
        artifact.overall_status = settle_overall_status(&artifact);
        artifact.key_findings = findings::synthesize_findings(&artifact);
        artifact.recommendations = findings::synthesize_recommendations(&artifact);
        artifact.stage_results.insert(
            StageName::Aggregation,
            StageResult {
                status: StageStatus::Success,
                data: None,
                errors: Vec::new(),
                started_at: Some(started),
                ended_at: Some(Utc::now()),
            },
        );
        self.persist(&mut artifact)?;

        tracing::info!(
            run_id = %this_run,
            status = artifact.overall_status.as_str(),
            "Analysis run finished"
        );
        Ok(artifact)
    }

    /// Run the analyses for several documents and build the comparison.
    pub fn compare(&self, requests: &[RunRequest]) -> Result<Comparison, RunError> {
        let mut artifacts = Vec::with_capacity(requests.len());
        for request in requests {
            artifacts.push(self.run(request)?);
        }
        let comparison = ComparisonEngine::compare(&self.ctx, &artifacts)
            .map_err(|e| RunError::Comparison(e.to_string()))?;
        self.store.save_comparison(&comparison)?;
        Ok(comparison)
    }

    /// Status for a run, live or persisted.
    pub fn status(&self, run_id: &str) -> Result<RunStatus, RunError> {
        let live = self
            .live
            .lock()
            .ok()
            .and_then(|registry| registry.get(run_id).cloned());

        let artifact = self.store.load_artifact(run_id)?;
        match (live, artifact) {
            (Some(live), artifact) => {
                let stage = live.stage.lock().map(|s| *s).unwrap_or(StageName::Extraction);
                Ok(RunStatus {
                    run_id: run_id.to_string(),
                    stage,
                    progress: live.progress(),
                    overall_status: artifact
                        .map(|a| a.overall_status)
                        .unwrap_or(OverallStatus::Failed),
                    artifact_refs: vec![format!("artifacts/{run_id}.json")],
                    running: true,
                })
            }
            (None, Some(artifact)) => Ok(RunStatus {
                run_id: run_id.to_string(),
                stage: StageName::Aggregation,
                progress: 1.0,
                overall_status: artifact.overall_status,
                artifact_refs: vec![format!("artifacts/{run_id}.json")],
                running: false,
            }),
            (None, None) => Err(RunError::UnknownRun(run_id.to_string())),
        }
    }

    /// Request cooperative cancellation; observed at the next
    /// suspension point. Returns false for unknown or finished runs.
    pub fn cancel(&self, run_id: &str) -> bool {
        let Ok(registry) = self.live.lock() else {
            return false;
        };
        match registry.get(run_id) {
            Some(live) => {
                live.cancel.cancel();
                true
            }
            None => false,
        }
    }

    // ── internals ──────────────────────────────────────────

    fn stage_deadline(&self) -> Option<Instant> {
        Some(Instant::now() + Duration::from_millis(self.ctx.config.stage_timeout_ms))
    }

    fn persist(&self, artifact: &mut AnalysisArtifact) -> Result<(), StoreError> {
        artifact.updated_at = Utc::now();
        self.store.save_artifact(artifact)
    }

    /// Chunk the text, embed fragment batches, and upsert the vectors
    /// under run-scoped ids so a failed stage can be rolled back.
    fn chunk_and_embed(
        &self,
        doc_id: &str,
        run_id: &str,
        text: &str,
        signal: &StageSignal,
    ) -> Result<Vec<Fragment>, AgentError> {
        let mut fragments = chunk_text(doc_id, text, &self.ctx.config.chunk);
        signal.set_total(fragments.len());

        let mut items = Vec::with_capacity(fragments.len());
        for batch_start in (0..fragments.len()).step_by(EMBED_BATCH) {
            signal.checkpoint(batch_start)?;
            let batch_end = (batch_start + EMBED_BATCH).min(fragments.len());
            let texts: Vec<&str> = fragments[batch_start..batch_end]
                .iter()
                .map(|f| f.text.as_str())
                .collect();
            let vectors = self.ctx.embedder.embed_batch(&texts)?;
            for (offset, vector) in vectors.into_iter().enumerate() {
                let fragment = &mut fragments[batch_start + offset];
                items.push(VectorItem {
                    id: format!("{run_id}:{}", fragment.ordinal),
                    text: fragment.text.clone(),
                    metadata: BTreeMap::from([
                        ("doc_id".to_string(), doc_id.to_string()),
                        ("run_id".to_string(), run_id.to_string()),
                        ("ordinal".to_string(), fragment.ordinal.to_string()),
                    ]),
                    vector: vector.clone(),
                });
                fragment.vector = Some(vector);
            }
        }
        signal.checkpoint(fragments.len())?;

        self.ctx.vectors.upsert(FRAGMENT_COLLECTION, &items)?;
        Ok(fragments)
    }

    /// Mark a critical stage failed, roll back its vector writes, and
    /// return the failed artifact (fatal errors return Err instead).
    fn fail_critical(
        &self,
        mut artifact: AnalysisArtifact,
        stage: StageName,
        started: chrono::DateTime<Utc>,
        error: AgentError,
        run_id: &str,
    ) -> Result<AnalysisArtifact, RunError> {
        if error.is_fatal() {
            return Err(fatal_to_run_error(error));
        }

        if let Err(e) = self
            .ctx
            .vectors
            .delete_by_prefix(FRAGMENT_COLLECTION, &format!("{run_id}:"))
        {
            tracing::warn!(run_id, error = %e, "Vector rollback failed");
        }

        tracing::error!(run_id, stage = %stage, error = %error, "Critical stage failed");
        artifact.stage_results.insert(
            stage,
            StageResult {
                status: StageStatus::Failed,
                data: None,
                errors: vec![error.to_string()],
                started_at: Some(started),
                ended_at: Some(Utc::now()),
            },
        );
        artifact.overall_status = OverallStatus::Failed;
        artifact.key_findings = findings::synthesize_findings(&artifact);
        self.persist(&mut artifact)?;
        Ok(artifact)
    }

    /// Execute the post-classification agents on a bounded pool.
    #[allow(clippy::too_many_arguments)]
    fn run_concurrent(
        &self,
        live: &LiveRun,
        agents: Vec<Box<dyn AnalysisAgent>>,
        document: &Document,
        run_id: &str,
        text: &str,
        fragments: &[Fragment],
        classification: &crate::models::ClassificationResult,
        reference_date: chrono::NaiveDate,
    ) -> Vec<(StageName, chrono::DateTime<Utc>, chrono::DateTime<Utc>, Result<StageData, AgentError>)>
    {
        let pool = self.ctx.config.effective_pool_size().min(agents.len().max(1));
        let queue: Mutex<VecDeque<Box<dyn AnalysisAgent>>> = Mutex::new(agents.into());
        let results = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..pool {
                scope.spawn(|| loop {
                    let agent = match queue.lock() {
                        Ok(mut queue) => match queue.pop_front() {
                            Some(agent) => agent,
                            None => break,
                        },
                        Err(_) => break,
                    };

                    let stage = agent.name();
                    let signal = live.signal_for(stage, self.stage_deadline());
                    let input = StageInput {
                        document,
                        run_id,
                        text,
                        fragments,
                        classification: Some(classification),
                        reference_date,
                    };
                    let started = Utc::now();
                    let outcome = agent.run(&self.ctx, &input, &signal);
                    let ended = Utc::now();
                    if let Ok(mut results) = results.lock() {
                        results.push((stage, started, ended, outcome));
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_default();
        // Deterministic artifact assembly regardless of completion order.
        results.sort_by_key(|(stage, ..)| *stage);
        results
    }
}

fn fatal_to_run_error(error: AgentError) -> RunError {
    match error {
        AgentError::VectorStore(e) => RunError::VectorStore(e),
        AgentError::Embedding(e) => RunError::Embedding(e),
        other => RunError::CriticalStage {
            stage: StageName::Aggregation,
            reason: other.to_string(),
        },
    }
}

/// Overall status rules: classification failing fails the run; with a
/// successful classification the run is a success when every downstream
/// stage succeeded, a partial success when at least one did, and failed
/// when none did.
fn settle_overall_status(artifact: &AnalysisArtifact) -> OverallStatus {
    if !artifact.stage_succeeded(StageName::Classification) {
        return OverallStatus::Failed;
    }
    let downstream = [StageName::Validation, StageName::Risk, StageName::Ruc];
    let succeeded = downstream
        .iter()
        .filter(|stage| artifact.stage_succeeded(**stage))
        .count();
    if succeeded == downstream.len() {
        OverallStatus::Success
    } else if succeeded > 0 {
        OverallStatus::PartialSuccess
    } else {
        OverallStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::pipeline::context::AnalysisContext;

    /// A complete proposal: one substantial block per taxonomy section
    /// (so windows stay section-pure), then a closing block that covers
    /// the compliance rules and carries future-dated deadlines.
    fn sample_document_text() -> String {
        let taxonomy = crate::pipeline::taxonomy::Taxonomy::builtin();
        let filler: std::collections::BTreeMap<&str, &str> = [
            ("convocatoria", "La entidad contratante invita a participar en el proceso de contratación. "),
            ("objeto", "El objeto de la contratación comprende la construcción de la obra civil descrita en el alcance. "),
            ("condiciones_generales", "Las obligaciones de las partes se rigen por la normatividad vigente y el marco legal aplicable. "),
            ("condiciones_particulares", "Los documentos habilitantes y requisitos específicos se detallan en las condiciones particulares. "),
            ("requisitos_tecnicos", "Las especificaciones técnicas y las normas de calidad exigidas incluyen certificaciones requeridas. "),
            ("condiciones_economicas", "La propuesta económica indicará la forma de pago, el anticipo y el valor del contrato. "),
            ("garantias", "El contratista entregará la garantía de fiel cumplimiento y la póliza de cumplimiento exigida. "),
            ("plazos", "El cronograma define el plazo de ejecución y las fechas de entrega de los hitos del proyecto. "),
            ("formularios", "Los formularios y anexos siguen el formato de presentación del formulario único de la oferta. "),
        ]
        .into_iter()
        .collect();

        let mut parts = Vec::new();
        for section in &taxonomy.sections {
            let detail = filler.get(section.key.as_str()).copied().unwrap_or("");
            let mut block = format!("{}. {detail}", section.keywords.join(". "));
            while block.len() < 1_800 {
                block.push_str(detail);
                block.push_str(&section.keywords[..3.min(section.keywords.len())].join(". "));
                block.push_str(". ");
            }
            parts.push(block);
        }
        parts.push(
            "Certificado de existencia y representación legal. RUC de la empresa \
             1790016919001. Estados financieros. Póliza de cumplimiento. Experiencia \
             específica. Propuesta técnica y propuesta económica con plan de trabajo \
             y entregables. Especificaciones técnicas mínimas. Certificaciones \
             requeridas. Normas de calidad. Estándares internacionales norma ISO 9001. \
             Ley 10 de 2021, decreto 44, resolución 9, normatividad vigente, marco \
             legal aplicable. Valor del contrato USD 500.000, forma de pago con \
             anticipo del 20%, garantías económicas. Plazo de ejecución de 120 días, \
             cronograma de actividades, fechas de entrega 10/10/2027, 20/11/2027 y \
             05/12/2027, fecha límite 15/12/2027, penalidades por retraso."
                .to_string(),
        );
        parts.join("\n\n")
    }

    fn runner_in(dir: &std::path::Path) -> AnalysisRunner {
        let mut config = AnalysisConfig::default();
        config.data_root = dir.to_path_buf();
        let ctx = AnalysisContext::from_config(config).unwrap();
        AnalysisRunner::new(ctx)
    }

    fn write_doc(dir: &std::path::Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn request(path: PathBuf) -> RunRequest {
        RunRequest {
            path,
            declared_type: Some(DocType::Proposal),
            level: AnalysisLevel::Comprehensive,
            force_rebuild: false,
        }
    }

    #[test]
    fn full_run_succeeds_on_complete_document() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());

        let artifact = runner.run(&request(path)).unwrap();

        assert_eq!(artifact.overall_status, OverallStatus::Success);
        for stage in [
            StageName::Extraction,
            StageName::Chunking,
            StageName::Classification,
            StageName::Validation,
            StageName::Risk,
            StageName::Ruc,
            StageName::Aggregation,
        ] {
            assert!(
                artifact.stage_succeeded(stage) || stage == StageName::Aggregation,
                "stage {stage} did not succeed: {:?}",
                artifact.stage(stage).status
            );
        }
        assert!(!artifact.key_findings.is_empty());

        let validation = artifact.validation().unwrap();
        assert!(validation.overall_score >= 80.0, "score {}", validation.overall_score);
        let risk = artifact.risk().unwrap();
        assert!(risk.overall_level <= crate::models::RiskLevel::Medium);
    }

    #[test]
    fn run_is_cached_when_successful() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());

        let first = runner.run(&request(path.clone())).unwrap();
        let second = runner.run(&request(path)).unwrap();
        // Cached return: identical timestamps prove no re-run happened.
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[test]
    fn force_rebuild_reruns() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());

        let first = runner.run(&request(path.clone())).unwrap();
        let mut rebuild = request(path);
        rebuild.force_rebuild = true;
        let second = runner.run(&rebuild).unwrap();
        assert!(second.updated_at > first.updated_at);
        assert_eq!(first.doc_id, second.doc_id);
    }

    #[test]
    fn fingerprint_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let text = sample_document_text();
        let path_a = write_doc(dir.path(), "a.txt", &text);
        let path_b = write_doc(dir.path(), "b.txt", &text);

        let a = runner.run(&request(path_a)).unwrap();
        let b = runner.run(&request(path_b)).unwrap();
        assert_eq!(a.doc_id, b.doc_id);
    }

    #[test]
    fn unsupported_input_does_not_start_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "datos.xyz", "contenido");

        let result = runner.run(&request(path));
        assert!(matches!(result, Err(RunError::Extraction(_))));
    }

    #[test]
    fn status_of_finished_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());
        let artifact = runner.run(&request(path)).unwrap();

        let status = runner.status(&artifact.run_id).unwrap();
        assert!(!status.running);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.overall_status, OverallStatus::Success);
        assert_eq!(status.artifact_refs, vec![format!("artifacts/{}.json", artifact.run_id)]);
    }

    #[test]
    fn status_of_unknown_run_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        assert!(matches!(
            runner.status("missing"),
            Err(RunError::UnknownRun(_))
        ));
    }

    #[test]
    fn resumption_reuses_completed_stages() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());

        // Simulate a crash after classification: run fully, then strip
        // the downstream stages and overall status from the stored
        // artifact, as an interrupted run would have left it.
        let full = runner.run(&request(path.clone())).unwrap();
        let mut interrupted = full.clone();
        interrupted.overall_status = OverallStatus::Failed;
        for stage in [StageName::Validation, StageName::Risk, StageName::Ruc, StageName::Aggregation] {
            interrupted.stage_results.insert(stage, StageResult::skipped());
        }
        runner.store().save_artifact(&interrupted).unwrap();

        let resumed = runner.run(&request(path)).unwrap();
        assert_eq!(resumed.overall_status, OverallStatus::Success);
        // The classification carried over untouched from the first run.
        assert_eq!(
            resumed.stage(StageName::Classification).started_at,
            full.stage(StageName::Classification).started_at
        );
        let original = full.validation().unwrap();
        let replayed = resumed.validation().unwrap();
        assert_eq!(original.overall_score, replayed.overall_score);
    }

    #[test]
    fn stage_timeout_yields_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AnalysisConfig::default();
        config.data_root = dir.path().to_path_buf();
        let ctx = AnalysisContext::from_config(config).unwrap();
        let runner = AnalysisRunner::new(ctx);
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());

        // Pre-complete everything except risk, then force a zero budget
        // so the remaining stage times out immediately.
        let full = runner.run(&request(path.clone())).unwrap();
        let mut interrupted = full.clone();
        interrupted.overall_status = OverallStatus::Failed;
        interrupted
            .stage_results
            .insert(StageName::Risk, StageResult::skipped());
        runner.store().save_artifact(&interrupted).unwrap();

        let mut config = AnalysisConfig::default();
        config.data_root = dir.path().to_path_buf();
        config.stage_timeout_ms = 0;
        let strict = AnalysisRunner::new(AnalysisContext::from_config(config).unwrap());
        // Chunking shares the zero budget and may itself time out on
        // the re-run; whatever stage hits the expired budget first, the
        // rerun must never report a full success.
        match strict.run(&request(path)) {
            Ok(artifact) => {
                if artifact.stage_succeeded(StageName::Classification) {
                    assert_ne!(artifact.overall_status, OverallStatus::Success);
                }
            }
            Err(e) => panic!("run returned fatal error: {e}"),
        }
    }

    #[test]
    fn overall_status_rules() {
        let mut artifact = AnalysisArtifact::new(
            "run-s",
            "doc-s",
            AnalysisLevel::Basic,
            Utc::now().date_naive(),
        );
        let success = || StageResult {
            status: StageStatus::Success,
            data: None,
            errors: vec![],
            started_at: None,
            ended_at: None,
        };
        let failed = || StageResult {
            status: StageStatus::Failed,
            data: None,
            errors: vec!["Stage timed out".into()],
            started_at: None,
            ended_at: None,
        };

        // Classification failed → run failed.
        artifact.stage_results.insert(StageName::Classification, failed());
        assert_eq!(settle_overall_status(&artifact), OverallStatus::Failed);

        // Classification + all downstream → success.
        artifact.stage_results.insert(StageName::Classification, success());
        artifact.stage_results.insert(StageName::Validation, success());
        artifact.stage_results.insert(StageName::Risk, success());
        artifact.stage_results.insert(StageName::Ruc, success());
        assert_eq!(settle_overall_status(&artifact), OverallStatus::Success);

        // Risk timing out alone → partial success, others untouched.
        artifact.stage_results.insert(StageName::Risk, failed());
        assert_eq!(settle_overall_status(&artifact), OverallStatus::PartialSuccess);

        // Everything downstream failing → failed.
        artifact.stage_results.insert(StageName::Validation, failed());
        artifact.stage_results.insert(StageName::Ruc, failed());
        assert_eq!(settle_overall_status(&artifact), OverallStatus::Failed);
    }

    #[test]
    fn cancellation_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        assert!(!runner.cancel("not-running"));
    }

    #[test]
    fn comparison_ranks_two_documents() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());

        let strong = write_doc(dir.path(), "fuerte.txt", &sample_document_text());
        let weak_text = format!(
            "Propuesta breve. Objeto: obra menor. {}",
            "Sin mayores detalles técnicos ni económicos. ".repeat(120)
        );
        let weak = write_doc(dir.path(), "debil.txt", &weak_text);

        let comparison = runner
            .compare(&[request(strong), request(weak)])
            .unwrap();

        assert_eq!(comparison.doc_ids.len(), 2);
        let overall = comparison.numeric.get("overall_score").unwrap();
        assert_eq!(overall.ranking.len(), 2);
        let best = comparison.summary.best_score.unwrap();
        let worst = comparison.summary.worst_score.unwrap();
        assert!(best >= worst);
        // The strong document must outrank the weak one.
        let strong_id = &comparison.doc_ids[0];
        assert_eq!(&overall.ranking[0], strong_id);

        // Comparison is persisted and addressable.
        let loaded = runner
            .store()
            .load_comparison(&comparison.comparison_id)
            .unwrap();
        assert!(loaded.is_some());
    }

    #[test]
    fn vectors_written_under_run_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path());
        let path = write_doc(dir.path(), "propuesta.txt", &sample_document_text());
        let artifact = runner.run(&request(path)).unwrap();

        let count = runner.context().vectors.count(FRAGMENT_COLLECTION).unwrap();
        assert!(count > 0);
        let deleted = runner
            .context()
            .vectors
            .delete_by_prefix(FRAGMENT_COLLECTION, &format!("{}:", artifact.run_id))
            .unwrap();
        assert_eq!(deleted, count);
    }
}
