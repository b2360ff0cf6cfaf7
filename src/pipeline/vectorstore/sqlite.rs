//! SQLite-backed vector store.
//!
//! Each named collection is a directory under the vectors root holding a
//! single `store.db`. Embeddings are stored as little-endian f32 blobs;
//! search is brute-force cosine, which is sufficient at tender-document
//! scale (thousands of fragments per collection). Batch upserts run in
//! one transaction, so a crash leaves either all or none of the batch
//! visible. The orchestrator guarantees a single writer per collection;
//! readers open their own connections.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};

use super::{ScoredItem, VectorItem, VectorStoreError};
use crate::pipeline::embedding::cosine_similarity;

pub struct SqliteVectorStore {
    root: PathBuf,
}

impl SqliteVectorStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn collection_db(&self, name: &str) -> Result<PathBuf, VectorStoreError> {
        validate_name(name)?;
        Ok(self.root.join(name).join("store.db"))
    }

    fn open(&self, name: &str) -> Result<Connection, VectorStoreError> {
        let path = self.collection_db(name)?;
        if !path.exists() {
            return Err(VectorStoreError::CollectionNotFound(name.to_string()));
        }
        Connection::open(&path).map_err(|e| VectorStoreError::Unavailable(e.to_string()))
    }

    /// Create a collection with a fixed dimension, or open an existing
    /// one. Re-opening with a different dimension is a hard error.
    pub fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), VectorStoreError> {
        let path = self.collection_db(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn =
            Connection::open(&path).map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS items (
                 id TEXT PRIMARY KEY,
                 text TEXT NOT NULL,
                 metadata TEXT NOT NULL,
                 vector BLOB NOT NULL
             );",
        )?;

        let existing: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'dimension'", [], |row| {
                row.get(0)
            })
            .optional()?;

        match existing {
            Some(value) => {
                let stored: usize = value
                    .parse()
                    .map_err(|_| VectorStoreError::Backend(format!("corrupt dimension: {value}")))?;
                if stored != dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        collection: name.to_string(),
                        expected: stored,
                        got: dimension,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('dimension', ?1)",
                    params![dimension.to_string()],
                )?;
            }
        }
        Ok(())
    }

    pub fn dimension(&self, name: &str) -> Result<usize, VectorStoreError> {
        let conn = self.open(name)?;
        let value: String =
            conn.query_row("SELECT value FROM meta WHERE key = 'dimension'", [], |row| {
                row.get(0)
            })?;
        value
            .parse()
            .map_err(|_| VectorStoreError::Backend(format!("corrupt dimension: {value}")))
    }

    /// Insert or replace a batch atomically.
    pub fn upsert(&self, name: &str, items: &[VectorItem]) -> Result<usize, VectorStoreError> {
        let dimension = self.dimension(name)?;
        for item in items {
            if item.vector.len() != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: dimension,
                    got: item.vector.len(),
                });
            }
        }

        let mut conn = self.open(name)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO items (id, text, metadata, vector) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for item in items {
                let metadata = serde_json::to_string(&item.metadata)
                    .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
                stmt.execute(params![
                    item.id,
                    item.text,
                    metadata,
                    vector_to_bytes(&item.vector)
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(collection = name, count = items.len(), "Upserted vectors");
        Ok(items.len())
    }

    /// Top-k cosine search, optionally filtered on metadata equality.
    pub fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<ScoredItem>, VectorStoreError> {
        let dimension = self.dimension(name)?;
        if vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: dimension,
                got: vector.len(),
            });
        }

        let conn = self.open(name)?;
        let mut stmt = conn.prepare("SELECT id, text, metadata, vector FROM items")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut scored: Vec<ScoredItem> = Vec::new();
        for row in rows {
            let (id, text, metadata_json, blob) = row?;
            let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;

            if let Some(wanted) = filter {
                let matches = wanted
                    .iter()
                    .all(|(key, value)| metadata.get(key) == Some(value));
                if !matches {
                    continue;
                }
            }

            let stored = bytes_to_vector(&blob);
            let score = cosine_similarity(vector, &stored);
            scored.push(ScoredItem {
                id,
                score,
                text,
                metadata,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Delete entries whose id starts with `prefix`. Used to roll back
    /// the partial writes of a timed-out stage, keyed on run id.
    pub fn delete_by_prefix(&self, name: &str, prefix: &str) -> Result<usize, VectorStoreError> {
        let conn = self.open(name)?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let deleted = conn.execute(
            "DELETE FROM items WHERE id LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        Ok(deleted)
    }

    pub fn delete_ids(&self, name: &str, ids: &[String]) -> Result<usize, VectorStoreError> {
        let mut conn = self.open(name)?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM items WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    pub fn count(&self, name: &str) -> Result<usize, VectorStoreError> {
        let conn = self.open(name)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let mut names = Vec::new();
        if !self.root.exists() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join("store.db").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<(), VectorStoreError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidCollectionName(name.to_string()))
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    fn item(id: &str, vector: Vec<f32>) -> VectorItem {
        let mut metadata = BTreeMap::new();
        metadata.insert("doc_id".to_string(), "doc-1".to_string());
        VectorItem {
            id: id.to_string(),
            text: format!("texto {id}"),
            metadata,
            vector,
        }
    }

    #[test]
    fn upsert_and_count() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 4).unwrap();
        store
            .upsert(
                "fragments",
                &[item("a:0", vec![1.0, 0.0, 0.0, 0.0]), item("a:1", vec![0.0, 1.0, 0.0, 0.0])],
            )
            .unwrap();
        assert_eq!(store.count("fragments").unwrap(), 2);
    }

    #[test]
    fn upsert_replaces_same_id() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 2).unwrap();
        store.upsert("fragments", &[item("a:0", vec![1.0, 0.0])]).unwrap();
        store.upsert("fragments", &[item("a:0", vec![0.0, 1.0])]).unwrap();
        assert_eq!(store.count("fragments").unwrap(), 1);
    }

    #[test]
    fn dimension_mismatch_rejected_on_upsert() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 4).unwrap();
        let result = store.upsert("fragments", &[item("a:0", vec![1.0, 0.0])]);
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch { expected: 4, got: 2, .. })
        ));
    }

    #[test]
    fn dimension_mismatch_rejected_on_reopen() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 4).unwrap();
        let result = store.ensure_collection("fragments", 8);
        assert!(matches!(result, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn query_orders_by_similarity() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 3).unwrap();
        store
            .upsert(
                "fragments",
                &[
                    item("a:0", vec![1.0, 0.0, 0.0]),
                    item("a:1", vec![0.0, 1.0, 0.0]),
                    item("a:2", vec![0.9, 0.1, 0.0]),
                ],
            )
            .unwrap();

        let hits = store.query("fragments", &[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a:0");
        assert_eq!(hits[1].id, "a:2");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn query_applies_metadata_filter() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 2).unwrap();
        let mut other = item("b:0", vec![1.0, 0.0]);
        other.metadata.insert("doc_id".to_string(), "doc-2".to_string());
        store
            .upsert("fragments", &[item("a:0", vec![1.0, 0.0]), other])
            .unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("doc_id".to_string(), "doc-2".to_string());
        let hits = store
            .query("fragments", &[1.0, 0.0], 10, Some(&filter))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b:0");
    }

    #[test]
    fn delete_by_prefix_scopes_to_run() {
        let (_dir, store) = store();
        store.ensure_collection("fragments", 2).unwrap();
        store
            .upsert(
                "fragments",
                &[
                    item("run1:0", vec![1.0, 0.0]),
                    item("run1:1", vec![0.0, 1.0]),
                    item("run2:0", vec![1.0, 1.0]),
                ],
            )
            .unwrap();

        let deleted = store.delete_by_prefix("fragments", "run1:").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count("fragments").unwrap(), 1);
    }

    #[test]
    fn list_collections_sorted() {
        let (_dir, store) = store();
        store.ensure_collection("riesgos", 2).unwrap();
        store.ensure_collection("fragments", 2).unwrap();
        assert_eq!(
            store.list_collections().unwrap(),
            vec!["fragments".to_string(), "riesgos".to_string()]
        );
    }

    #[test]
    fn invalid_collection_name_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.ensure_collection("../escape", 2),
            Err(VectorStoreError::InvalidCollectionName(_))
        ));
    }

    #[test]
    fn missing_collection_errors() {
        let (_dir, store) = store();
        assert!(matches!(
            store.query("nope", &[1.0], 1, None),
            Err(VectorStoreError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn vector_blob_round_trip() {
        let original = vec![1.5f32, -0.25, 0.0, 3.14159];
        let bytes = vector_to_bytes(&original);
        assert_eq!(bytes_to_vector(&bytes), original);
    }
}
