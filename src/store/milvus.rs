//! Milvus vector database over its RESTful API (v2).
//!
//! Collections use an auto-generated `id` primary key, a `vector` float
//! vector field indexed with COSINE similarity, and `text` / `source`
//! VarChar fields for the chunk and the file it came from.

use super::{SearchHit, VectorStore, check_lengths};
use crate::chunk::Chunk;
use crate::config::MilvusConfig;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Duration;

const MAX_TEXT_LENGTH: usize = 65_535;
const MAX_SOURCE_LENGTH: usize = 1_024;
/// Rows sent per insert request.
const INSERT_BATCH: usize = 500;

#[derive(Debug, Deserialize)]
struct MilvusResponse<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResult {
    insert_count: usize,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    #[serde(default)]
    fields: Vec<FieldDescription>,
}

#[derive(Debug, Deserialize)]
struct FieldDescription {
    name: String,
    #[serde(default)]
    params: Vec<FieldParam>,
}

#[derive(Debug, Deserialize)]
struct FieldParam {
    key: String,
    value: Value,
}

impl CollectionDescription {
    fn vector_dimension(&self) -> Option<usize> {
        let field = self.fields.iter().find(|f| f.name == "vector")?;
        let param = field.params.iter().find(|p| p.key == "dim")?;
        match &param.value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        }
    }
}

/// Milvus client.
pub struct MilvusStore {
    client: Client,
    config: MilvusConfig,
}

impl MilvusStore {
    pub fn new(config: MilvusConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagEvalError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.config.endpoint(), path)
    }

    /// Add `dbName` when a database other than the default is configured.
    fn body(&self, mut body: Value) -> Value {
        if !self.config.database.is_empty() {
            if let Value::Object(map) = &mut body {
                map.insert("dbName".to_string(), json!(self.config.database));
            }
        }
        body
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>> {
        let mut request = self.client.post(self.url(path)).json(&self.body(body));
        if let Some(token) = self.config.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| connection_failure(&self.config, &e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(auth_failure(&format!("HTTP {}", status)));
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RagEvalError::VectorStore(format!(
                "Milvus {} failed ({}): {}",
                path, status, text
            )));
        }

        let parsed: MilvusResponse<T> = serde_json::from_str(&text).map_err(|e| {
            RagEvalError::VectorStore(format!("Unexpected Milvus response to {}: {}", path, e))
        })?;
        if parsed.code != 0 {
            let message = parsed.message.unwrap_or_default();
            return Err(classify(&self.config, parsed.code, &message));
        }
        Ok(parsed.data)
    }

    async fn describe(&self, collection: &str) -> Result<CollectionDescription> {
        self.call::<CollectionDescription>(
            "collections/describe",
            json!({ "collectionName": collection }),
        )
        .await?
        .ok_or_else(|| RagEvalError::VectorStore(format!("No description for '{}'", collection)))
    }

    fn create_body(collection: &str, dimension: usize) -> Value {
        json!({
            "collectionName": collection,
            "schema": {
                "autoId": true,
                "enableDynamicField": false,
                "fields": [
                    { "fieldName": "id", "dataType": "Int64", "isPrimary": true },
                    {
                        "fieldName": "vector",
                        "dataType": "FloatVector",
                        "elementTypeParams": { "dim": dimension.to_string() }
                    },
                    {
                        "fieldName": "text",
                        "dataType": "VarChar",
                        "elementTypeParams": { "max_length": MAX_TEXT_LENGTH.to_string() }
                    },
                    {
                        "fieldName": "source",
                        "dataType": "VarChar",
                        "elementTypeParams": { "max_length": MAX_SOURCE_LENGTH.to_string() }
                    }
                ]
            },
            "indexParams": [
                {
                    "fieldName": "vector",
                    "indexName": "vector_index",
                    "metricType": "COSINE",
                    "params": { "index_type": "AUTOINDEX" }
                }
            ]
        })
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn connection_failure(config: &MilvusConfig, error: &str) -> RagEvalError {
    RagEvalError::Connection(format!(
        "Cannot connect to Milvus server. Please ensure:\n\
         1. Milvus is running (check with: docker ps)\n\
         2. Host and port are correct ({}:{})\n\
         3. If using Docker, ensure ports are exposed correctly\n\
         To start one: docker run -d --name milvus-standalone -p 19530:19530 -p 9091:9091 milvusdb/milvus:latest\n\n\
         Error: {}",
        config.host, config.port, error
    ))
}

fn auth_failure(error: &str) -> RagEvalError {
    RagEvalError::Authentication(format!(
        "Authentication failed. Please check username/password.\n\nError: {}",
        error
    ))
}

fn classify(config: &MilvusConfig, code: i64, message: &str) -> RagEvalError {
    let lower = message.to_lowercase();
    if lower.contains("auth") || lower.contains("credential") || lower.contains("token") {
        auth_failure(message)
    } else if lower.contains("unavailable") || lower.contains("connection") {
        connection_failure(config, message)
    } else {
        RagEvalError::VectorStore(format!("Milvus error {}: {}", code, message))
    }
}

#[async_trait]
impl VectorStore for MilvusStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self
            .call::<Vec<String>>("collections/list", json!({}))
            .await?
            .unwrap_or_default())
    }

    async fn has_collection(&self, collection: &str) -> Result<bool> {
        Ok(self
            .call::<HasCollection>("collections/has", json!({ "collectionName": collection }))
            .await?
            .map(|h| h.has)
            .unwrap_or(false))
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        if self.has_collection(collection).await? {
            let existing = self.describe(collection).await?.vector_dimension();
            return match existing {
                Some(dim) if dim != dimension => Err(RagEvalError::VectorStore(format!(
                    "Collection '{}' stores {}-dimensional vectors, but the embedding model produces {}. Use a new collection for this model.",
                    collection, dim, dimension
                ))),
                _ => Ok(()),
            };
        }

        tracing::info!(collection, dimension, "creating Milvus collection");
        self.call::<Value>("collections/create", Self::create_body(collection, dimension))
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.call::<Value>("collections/drop", json!({ "collectionName": collection }))
            .await?;
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        check_lengths(chunks, embeddings)?;
        let mut inserted = 0;
        for (chunk_batch, vector_batch) in chunks
            .chunks(INSERT_BATCH)
            .zip(embeddings.chunks(INSERT_BATCH))
        {
            let rows: Vec<Value> = chunk_batch
                .iter()
                .zip(vector_batch)
                .map(|(chunk, vector)| {
                    json!({
                        "vector": vector,
                        "text": truncate(&chunk.text, MAX_TEXT_LENGTH),
                        "source": truncate(&chunk.source, MAX_SOURCE_LENGTH),
                    })
                })
                .collect();

            let result = self
                .call::<InsertResult>(
                    "entities/insert",
                    json!({ "collectionName": collection, "data": rows }),
                )
                .await?;
            inserted += result.map(|r| r.insert_count).unwrap_or(rows.len());
        }
        tracing::debug!(collection, inserted, "inserted chunks");
        Ok(inserted)
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let rows = self
            .call::<Vec<Value>>(
                "entities/search",
                json!({
                    "collectionName": collection,
                    "data": [query],
                    "annsField": "vector",
                    "limit": k,
                    "outputFields": ["text", "source"],
                }),
            )
            .await?
            .unwrap_or_default();

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| SearchHit {
                text: string_field(row, "text"),
                source: string_field(row, "source"),
                score: row.get("distance").and_then(Value::as_f64).unwrap_or(0.0) as f32,
            })
            .collect();
        hits.sort_by(|a, b| b.cmp(a));
        Ok(hits)
    }

    async fn list_sources(&self, collection: &str, limit: usize) -> Result<Vec<String>> {
        let rows = self
            .call::<Vec<Value>>(
                "entities/query",
                json!({
                    "collectionName": collection,
                    "filter": "",
                    "limit": limit,
                    "outputFields": ["source"],
                }),
            )
            .await?
            .unwrap_or_default();

        let sources: BTreeSet<String> = rows
            .iter()
            .map(|row| string_field(row, "source"))
            .filter(|s| !s.is_empty())
            .collect();
        Ok(sources.into_iter().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let rows = self
            .call::<Vec<Value>>(
                "entities/query",
                json!({
                    "collectionName": collection,
                    "filter": "",
                    "outputFields": ["count(*)"],
                }),
            )
            .await?
            .unwrap_or_default();
        Ok(rows
            .first()
            .and_then(|row| row.get("count(*)"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

fn string_field(row: &Value, name: &str) -> String {
    row.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Check that Milvus is reachable with the given settings by listing its
/// collections.
pub async fn test_connection(config: &MilvusConfig) -> Result<String> {
    let store = MilvusStore::new(config.clone())?;
    let collections = store.list_collections().await?;
    Ok(format!(
        "Connection successful! {} collection(s) at {}:{}",
        collections.len(),
        config.host,
        config.port
    ))
}
