//! Vector storage backends.
//!
//! Collections hold chunks of text with their embeddings. A collection's
//! vector dimension is fixed when it is created, so each collection is bound
//! to a single embedding model.
//!
//! - [`MilvusStore`]: Milvus over its RESTful API (the normal backend)
//! - [`MemoryStore`]: brute-force cosine search, for offline use and tests

mod memory;
mod milvus;

pub use memory::MemoryStore;
pub use milvus::{MilvusStore, test_connection};

use crate::chunk::Chunk;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rows read when listing the files of a collection.
pub const SOURCE_SAMPLE_LIMIT: usize = 100;

/// A search result with similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

impl PartialEq for SearchHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchHit {}

/// Trait for vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn has_collection(&self, collection: &str) -> Result<bool> {
        Ok(self
            .list_collections()
            .await?
            .iter()
            .any(|name| name == collection))
    }

    /// Create `collection` for vectors of `dimension`, or check that the
    /// existing one has that dimension.
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Insert chunks with their embeddings (same length). Returns the number
    /// of rows written.
    async fn insert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize>;

    /// Top-`k` chunks sorted by similarity, highest first.
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Distinct source files among the first `limit` rows, sorted.
    async fn list_sources(&self, collection: &str, limit: usize) -> Result<Vec<String>>;

    /// Number of stored chunks.
    async fn count(&self, collection: &str) -> Result<usize>;
}

pub(crate) fn check_lengths(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(crate::error::RagEvalError::VectorStore(format!(
            "Got {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(())
}
