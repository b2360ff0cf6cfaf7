pub mod sqlite;

pub use sqlite::SqliteVectorStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vector store backend error: {0}")]
    Backend(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Invalid collection name '{0}'")]
    InvalidCollectionName(String),

    #[error("Vector dimension mismatch in '{collection}': expected {expected}, got {got}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        got: usize,
    },

    #[error("Vector store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for VectorStoreError {
    fn from(e: rusqlite::Error) -> Self {
        VectorStoreError::Backend(e.to_string())
    }
}

/// One entry of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorItem {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub vector: Vec<f32>,
}

/// Query hit, best-first by cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}
