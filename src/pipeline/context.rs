//! Shared, read-only analysis context.
//!
//! Loaded once at startup and passed by reference into every stage:
//! taxonomy, rule sets, indicator banks, the embedding chain, the vector
//! store and the optional registry adapter. No stage mutates it; the
//! only writable surface of the pipeline is the artifact store.

use std::collections::BTreeMap;

use crate::config::{AnalysisConfig, ConfigError};
use crate::pipeline::agents::ruc::RucRegistry;
use crate::pipeline::embedding::{EmbeddingModel, FallbackEmbedder, HASH_EMBEDDER_DIM};
use crate::pipeline::indicators::IndicatorBank;
use crate::pipeline::rules::RuleSets;
use crate::pipeline::taxonomy::Taxonomy;
use crate::pipeline::vectorstore::{SqliteVectorStore, VectorItem, VectorStoreError};

/// Collection holding the per-section seed centroids.
pub const SEED_COLLECTION: &str = "taxonomy-seeds";
/// Collection holding the risk-category seed centroids.
pub const RISK_SEED_COLLECTION: &str = "risk-seeds";
/// Collection holding document fragment vectors.
pub const FRAGMENT_COLLECTION: &str = "fragments";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Embedding bootstrap failed: {0}")]
    Embedding(#[from] crate::pipeline::embedding::EmbeddingError),

    #[error("Vector store bootstrap failed: {0}")]
    VectorStore(#[from] VectorStoreError),
}

pub struct AnalysisContext {
    pub config: AnalysisConfig,
    pub taxonomy: Taxonomy,
    pub rules: RuleSets,
    pub indicators: IndicatorBank,
    pub embedder: FallbackEmbedder,
    pub vectors: SqliteVectorStore,
    pub ruc_registry: Option<Box<dyn RucRegistry>>,
    /// Section key → centroid of the section's keyword embeddings.
    section_centroids: BTreeMap<String, Vec<f32>>,
    /// Risk category key → centroid of the category's seed embeddings.
    risk_centroids: BTreeMap<String, Vec<f32>>,
}

impl AnalysisContext {
    /// Build the full context: load tables (file overrides or built-in),
    /// assemble the embedding chain, open the vector store, and seed the
    /// taxonomy / risk centroids.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, ContextError> {
        config.validate()?;

        let taxonomy = match &config.taxonomy_path {
            Some(path) => Taxonomy::load(path)?,
            None => Taxonomy::builtin(),
        };
        let rules = match &config.rules_path {
            Some(path) => RuleSets::load(path)?,
            None => RuleSets::builtin(),
        };
        let indicators = match &config.indicators_path {
            Some(path) => IndicatorBank::load(path)?,
            None => IndicatorBank::builtin(),
        };

        let embedder = FallbackEmbedder::from_config(&config.embedding, HASH_EMBEDDER_DIM)?;
        let vectors = SqliteVectorStore::new(config.vectors_dir());

        let mut ctx = Self {
            config,
            taxonomy,
            rules,
            indicators,
            embedder,
            vectors,
            ruc_registry: None,
            section_centroids: BTreeMap::new(),
            risk_centroids: BTreeMap::new(),
        };
        ctx.seed_centroids()?;
        Ok(ctx)
    }

    pub fn with_ruc_registry(mut self, registry: Box<dyn RucRegistry>) -> Self {
        self.ruc_registry = Some(registry);
        self
    }

    /// Embed the taxonomy keywords and risk seeds, compute centroids,
    /// and persist them so the store carries the system of record.
    fn seed_centroids(&mut self) -> Result<(), ContextError> {
        let dimension = self.embedder.dimension();
        self.vectors.ensure_collection(SEED_COLLECTION, dimension)?;
        self.vectors.ensure_collection(RISK_SEED_COLLECTION, dimension)?;
        self.vectors.ensure_collection(FRAGMENT_COLLECTION, dimension)?;

        let mut seed_items = Vec::new();
        for section in &self.taxonomy.sections {
            let texts: Vec<&str> = section.keywords.iter().map(|k| k.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            let centroid = centroid_of(&vectors, dimension);
            seed_items.push(VectorItem {
                id: format!("section:{}", section.key),
                text: section.keywords.join(", "),
                metadata: BTreeMap::from([("section".to_string(), section.key.clone())]),
                vector: centroid.clone(),
            });
            self.section_centroids.insert(section.key.clone(), centroid);
        }
        self.vectors.upsert(SEED_COLLECTION, &seed_items)?;

        let mut risk_items = Vec::new();
        for category in &self.indicators.categories {
            let texts: Vec<&str> = category.seeds.iter().map(|s| s.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            let centroid = centroid_of(&vectors, dimension);
            risk_items.push(VectorItem {
                id: format!("risk:{}", category.key),
                text: category.seeds.join(", "),
                metadata: BTreeMap::from([("category".to_string(), category.key.clone())]),
                vector: centroid.clone(),
            });
            self.risk_centroids.insert(category.key.clone(), centroid);
        }
        self.vectors.upsert(RISK_SEED_COLLECTION, &risk_items)?;

        tracing::debug!(
            sections = self.section_centroids.len(),
            risk_categories = self.risk_centroids.len(),
            "Seed centroids ready"
        );
        Ok(())
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn section_centroid(&self, section: &str) -> Option<&Vec<f32>> {
        self.section_centroids.get(section)
    }

    pub fn risk_centroid(&self, category: &str) -> Option<&Vec<f32>> {
        self.risk_centroids.get(category)
    }
}

/// Mean of a set of vectors, L2-normalized.
fn centroid_of(vectors: &[Vec<f32>], dimension: usize) -> Vec<f32> {
    let mut centroid = vec![0.0f32; dimension];
    if vectors.is_empty() {
        return centroid;
    }
    for vector in vectors {
        for (slot, value) in centroid.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    for slot in centroid.iter_mut() {
        *slot /= n;
    }
    crate::pipeline::embedding::l2_normalize(&mut centroid);
    centroid
}

#[cfg(test)]
pub fn test_context(data_root: &std::path::Path) -> AnalysisContext {
    let mut config = AnalysisConfig::default();
    config.data_root = data_root.to_path_buf();
    AnalysisContext::from_config(config).expect("test context")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_builds_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        assert_eq!(ctx.taxonomy.sections.len(), 9);
        assert_eq!(ctx.indicators.categories.len(), 5);
        assert!(ctx.section_centroid("objeto").is_some());
        assert!(ctx.risk_centroid("technical").is_some());
    }

    #[test]
    fn centroids_are_persisted_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        assert_eq!(ctx.vectors.count(SEED_COLLECTION).unwrap(), 9);
        assert_eq!(ctx.vectors.count(RISK_SEED_COLLECTION).unwrap(), 5);
    }

    #[test]
    fn centroids_are_unit_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        for key in ctx.taxonomy.keys() {
            let centroid = ctx.section_centroid(&key).unwrap();
            let norm: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.01, "section {key} centroid norm {norm}");
        }
    }

    #[test]
    fn centroid_of_empty_set_is_zero() {
        let centroid = centroid_of(&[], 4);
        assert_eq!(centroid, vec![0.0; 4]);
    }
}
