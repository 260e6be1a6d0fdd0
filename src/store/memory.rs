//! In-memory vector store using brute-force cosine similarity, with JSON snapshots.

use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SearchHit, VectorStore, check_lengths};
use crate::chunk::Chunk;
use crate::embed::cosine_similarity;
use crate::error::{RagEvalError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryCollection {
    dimension: usize,
    rows: Vec<StoredRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    text: String,
    source: String,
    vector: Vec<f32>,
}

/// In-memory vector store.
///
/// Uses brute-force cosine similarity search. Suitable for small datasets
/// and tests; the whole store can be saved to and loaded from a JSON file.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
        let collections: HashMap<String, MemoryCollection> = serde_json::from_str(&json)
            .map_err(|e| RagEvalError::Serialization(e.to_string()))?;
        Ok(Self {
            collections: RwLock::new(collections),
        })
    }

    /// Write every collection to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let collections = self.read()?;
            serde_json::to_string(&*collections)
                .map_err(|e| RagEvalError::Serialization(e.to_string()))?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RagEvalError::io(parent, e))?;
            }
        }
        std::fs::write(path, json).map_err(|e| RagEvalError::io(path, e))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .read()
            .map_err(|_| RagEvalError::VectorStore("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .write()
            .map_err(|_| RagEvalError::VectorStore("memory store lock poisoned".to_string()))
    }
}

fn missing(collection: &str) -> RagEvalError {
    RagEvalError::VectorStore(format!("Collection '{}' does not exist", collection))
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let mut collections = self.write()?;
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                dimension,
                rows: Vec::new(),
            });
        if entry.dimension != dimension {
            return Err(RagEvalError::VectorStore(format!(
                "Collection '{}' stores {}-dimensional vectors, but the embedding model produces {}. Use a new collection for this model.",
                collection, entry.dimension, dimension
            )));
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.write()?.remove(collection);
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        check_lengths(chunks, embeddings)?;
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = embeddings.iter().find(|v| v.len() != target.dimension) {
            return Err(RagEvalError::VectorStore(format!(
                "Expected {}-dimensional vectors, got {}",
                target.dimension,
                bad.len()
            )));
        }

        for (chunk, vector) in chunks.iter().zip(embeddings) {
            target.rows.push(StoredRow {
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                vector: vector.clone(),
            });
        }
        Ok(chunks.len())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut results = BinaryHeap::with_capacity(target.rows.len());
        for row in &target.rows {
            results.push(SearchHit {
                text: row.text.clone(),
                source: row.source.clone(),
                score: cosine_similarity(query, &row.vector),
            });
        }

        Ok(results
            .into_sorted_vec()
            .into_iter()
            .rev()
            .take(k)
            .collect())
    }

    async fn list_sources(&self, collection: &str, limit: usize) -> Result<Vec<String>> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        let sources: BTreeSet<String> = target
            .rows
            .iter()
            .take(limit)
            .map(|row| row.source.clone())
            .collect();
        Ok(sources.into_iter().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(target.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            index: 0,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_collection("docs", 3).await.unwrap();
        let chunks = vec![
            make_chunk("far.txt", "far away"),
            make_chunk("close.txt", "very close"),
            make_chunk("medium.txt", "medium"),
        ];
        // Query will be [1, 0, 0]
        let embeddings = vec![
            vec![0.0, 1.0, 0.0], // orthogonal to query
            vec![1.0, 0.0, 0.0], // identical to query
            vec![0.5, 0.5, 0.0], // somewhat similar
        ];
        store.insert("docs", &chunks, &embeddings).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_returns_sorted() {
        let store = seeded().await;
        let results = store.search("docs", &[1.0, 0.0, 0.0], 3).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "very close");
        assert_eq!(results[1].text, "medium");
        assert_eq!(results[2].text, "far away");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let store = seeded().await;
        assert_eq!(store.search("docs", &[1.0, 0.0, 0.0], 2).await.unwrap().len(), 2);
        assert_eq!(store.search("docs", &[1.0, 0.0, 0.0], 100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dimension_is_fixed_per_collection() {
        let store = seeded().await;
        assert!(store.ensure_collection("docs", 3).await.is_ok());
        assert!(store.ensure_collection("docs", 768).await.is_err());

        let err = store
            .insert("docs", &[make_chunk("x", "x")], &[vec![1.0, 0.0]])
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = MemoryStore::new();
        assert!(store.search("nope", &[1.0], 1).await.is_err());
        assert!(!store.has_collection("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_sources_count_and_drop() {
        let store = seeded().await;
        store
            .insert("docs", &[make_chunk("close.txt", "again")], &[vec![0.0, 0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 4);
        assert_eq!(
            store.list_sources("docs", 100).await.unwrap(),
            vec!["close.txt", "far.txt", "medium.txt"]
        );
        assert_eq!(store.list_sources("docs", 1).await.unwrap(), vec!["far.txt"]);

        store.drop_collection("docs").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        seeded().await.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.count("docs").await.unwrap(), 3);
        let top = loaded.search("docs", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(top[0].source, "close.txt");
    }
}
