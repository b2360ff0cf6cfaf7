//! On-disk artifact store.
//!
//! Analysis artifacts and comparisons are JSON files under the data
//! root (`artifacts/{run_id}.json`, `comparisons/{comparison_id}.json`).
//! Writes go through a temp file plus rename so readers never observe a
//! half-written record; an unparseable file is a corruption error, not
//! a silent miss.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{AnalysisArtifact, Comparison};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted artifact store: {0}")]
    Corrupted(String),
}

pub struct ArtifactStore {
    artifacts_dir: PathBuf,
    comparisons_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(artifacts_dir: PathBuf, comparisons_dir: PathBuf) -> Self {
        Self {
            artifacts_dir,
            comparisons_dir,
        }
    }

    pub fn from_config(config: &crate::config::AnalysisConfig) -> Self {
        Self::new(config.artifacts_dir(), config.comparisons_dir())
    }

    fn artifact_path(&self, run_id: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{run_id}.json"))
    }

    fn comparison_path(&self, comparison_id: &str) -> PathBuf {
        self.comparisons_dir.join(format!("{comparison_id}.json"))
    }

    /// Atomic write: serialize to a sibling temp file, then rename.
    fn write_atomic(&self, path: &PathBuf, json: String) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Corrupted("artifact path has no parent".to_string()))?;
        std::fs::create_dir_all(parent)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn save_artifact(&self, artifact: &AnalysisArtifact) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(artifact)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        self.write_atomic(&self.artifact_path(&artifact.run_id), json)?;
        tracing::debug!(run_id = %artifact.run_id, "Artifact persisted");
        Ok(())
    }

    pub fn load_artifact(&self, run_id: &str) -> Result<Option<AnalysisArtifact>, StoreError> {
        let path = self.artifact_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let artifact = serde_json::from_str(&raw).map_err(|e| {
            StoreError::Corrupted(format!("{}: {e}", path.display()))
        })?;
        Ok(Some(artifact))
    }

    /// Most recently updated artifact for a document, across analysis
    /// levels.
    pub fn latest_artifact_for_doc(
        &self,
        doc_id: &str,
    ) -> Result<Option<AnalysisArtifact>, StoreError> {
        if !self.artifacts_dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<AnalysisArtifact> = None;
        for entry in std::fs::read_dir(&self.artifacts_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(doc_id) || !name.ends_with(".json") {
                continue;
            }
            let raw = std::fs::read_to_string(entry.path())?;
            let artifact: AnalysisArtifact = serde_json::from_str(&raw)
                .map_err(|e| StoreError::Corrupted(format!("{name}: {e}")))?;
            let newer = latest
                .as_ref()
                .map(|current| artifact.updated_at > current.updated_at)
                .unwrap_or(true);
            if newer {
                latest = Some(artifact);
            }
        }
        Ok(latest)
    }

    pub fn save_comparison(&self, comparison: &Comparison) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(comparison)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        self.write_atomic(&self.comparison_path(&comparison.comparison_id), json)?;
        tracing::debug!(comparison_id = %comparison.comparison_id, "Comparison persisted");
        Ok(())
    }

    pub fn load_comparison(&self, comparison_id: &str) -> Result<Option<Comparison>, StoreError> {
        let path = self.comparison_path(comparison_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let comparison = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", path.display())))?;
        Ok(Some(comparison))
    }
}
