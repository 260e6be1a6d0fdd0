//! RAG Evaluator - build a retrieval-augmented generation pipeline over a
//! vector database and score its answers with an LLM judge.
//!
//! # Overview
//!
//! 1. Documents (PDF, DOCX, TXT, Markdown) are extracted, split into
//!    overlapping chunks, embedded and stored in a Milvus collection
//! 2. Questions from a spreadsheet are answered by an LLM using the chunks
//!    most similar to each question
//! 3. A judge LLM scores every answer against the ground truth on a set of
//!    metrics (eight built in, plus any custom ones)
//! 4. Results are exported to Excel
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_evaluator::{
//!     config::Config,
//!     embed::create_embedder,
//!     eval::{EvaluationRunner, LlmJudge, MetricSet},
//!     llm::create_chat_model,
//!     rag::RagPipeline,
//!     sheet::read_eval_rows,
//!     store::MilvusStore,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate_llm()?;
//!     config.validate_judge()?;
//!
//!     let pipeline = RagPipeline::new(
//!         create_chat_model(&config.llm)?,
//!         create_embedder(&config.embedding).await?,
//!         Box::new(MilvusStore::new(config.milvus.clone())?),
//!         "my_collection",
//!         config.rag.num_chunks,
//!     );
//!     let judge = LlmJudge::from_config(&config.judge)?;
//!     let runner = EvaluationRunner::new(pipeline, judge, MetricSet::default());
//!
//!     let rows = read_eval_rows(Path::new("evaluation.xlsx"))?;
//!     let report = runner.run(&rows, Some(5)).await?;
//!     report.print_summary(runner.metrics());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **ChatModel**: OpenAI-compatible and Anthropic chat clients
//! - **Embedder**: hosted, Ollama and optional local embedding models
//! - **VectorStore**: Milvus over REST, or an in-memory store
//! - **RagPipeline**: retrieval plus answer generation
//! - **LlmJudge**: metric scoring with tolerant JSON parsing
//! - **Session**: active collection, custom metrics and selected models

pub mod catalog;
pub mod chunk;
pub mod config;
pub mod document;
pub mod embed;
pub mod error;
pub mod eval;
pub mod llm;
pub mod ocr;
pub mod persistence;
pub mod rag;
pub mod session;
pub mod sheet;
pub mod store;

// Re-export commonly used types
pub use chunk::{Chunk, ChunkConfig, TextSplitter};
pub use config::Config;
pub use document::{Document, DocumentLoader};
pub use error::{RagEvalError, Result};
pub use eval::{EvaluationResult, EvaluationRunner, LlmJudge, MetricSet};
pub use llm::{ChatModel, LlmClient};
pub use persistence::{load_session, save_session};
pub use rag::{Ingestor, RagPipeline};
pub use session::Session;
pub use store::{MemoryStore, MilvusStore, VectorStore};
