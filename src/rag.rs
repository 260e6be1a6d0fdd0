//! Retrieval-augmented answering and document ingestion.

use crate::chunk::TextSplitter;
use crate::document::{Document, DocumentLoader, source_name};
use crate::embed::Embedder;
use crate::error::{RagEvalError, Result};
use crate::eval::dataset::QuestionRow;
use crate::llm::{ChatModel, Prompts, fill};
use crate::store::{SearchHit, VectorStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An answer with the chunks it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    /// Empty when generation failed.
    pub sources: Vec<SearchHit>,
}

impl RagAnswer {
    /// Text of the retrieved chunks, best match first.
    pub fn retrieved_chunks(&self) -> Vec<String> {
        self.sources.iter().map(|hit| hit.text.clone()).collect()
    }
}

/// Render prior conversation the way it is fed to the prompts: one seed
/// exchange whose assistant turn carries the whole history.
pub fn render_chat_history(chat_history: &str) -> String {
    if chat_history.trim().is_empty() {
        return String::new();
    }
    format!(
        "Human: Previous conversation context\nAssistant: {}",
        chat_history
    )
}

/// Answers questions from one collection.
pub struct RagPipeline {
    llm: Box<dyn ChatModel>,
    embedder: Box<dyn Embedder>,
    store: Box<dyn VectorStore>,
    collection: String,
    num_chunks: usize,
}

impl RagPipeline {
    pub fn new(
        llm: Box<dyn ChatModel>,
        embedder: Box<dyn Embedder>,
        store: Box<dyn VectorStore>,
        collection: impl Into<String>,
        num_chunks: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            collection: collection.into(),
            num_chunks,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `"<provider> - <model>"` of the answering model.
    pub fn model(&self) -> String {
        self.llm.describe()
    }

    /// Answer `question`. Failures are reported in the answer text and leave
    /// `sources` empty.
    pub async fn answer(&self, question: &str, chat_history: &str) -> RagAnswer {
        match self.try_answer(question, chat_history).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(collection = %self.collection, "RAG generation failed: {}", e);
                RagAnswer {
                    answer: format!("Error generating response: {}", e),
                    sources: Vec::new(),
                }
            }
        }
    }

    async fn try_answer(&self, question: &str, chat_history: &str) -> Result<RagAnswer> {
        let history = render_chat_history(chat_history);

        // Follow-up questions are rewritten before retrieval.
        let question = if history.is_empty() {
            question.to_string()
        } else {
            let prompt = fill(
                Prompts::condense_question(),
                &[("chat_history", &history), ("question", question)],
            );
            let standalone = self.llm.complete(None, &prompt).await?;
            tracing::debug!(standalone = %standalone.trim(), "condensed question");
            standalone.trim().to_string()
        };

        let query = self.embedder.embed_query(&question).await?;
        let sources = self
            .store
            .search(&self.collection, &query, self.num_chunks)
            .await?;
        let context = sources
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = fill(
            Prompts::rag_answer(),
            &[
                ("context", &context),
                ("chat_history", &history),
                ("question", &question),
            ],
        );
        let answer = self.llm.complete(None, &prompt).await?;
        Ok(RagAnswer { answer, sources })
    }

    /// Answer the first `limit` questions in order.
    pub async fn generate_answers(
        &self,
        questions: &[QuestionRow],
        limit: Option<usize>,
    ) -> GenerationReport {
        let count = limit.unwrap_or(questions.len()).min(questions.len());
        let mut rows = Vec::with_capacity(count);

        for (idx, row) in questions.iter().take(count).enumerate() {
            tracing::info!(
                "Processing question {}/{}: {}",
                idx + 1,
                count,
                preview(&row.question, 50)
            );
            let answer = self.answer(&row.question, &row.chat_history).await;
            rows.push(GeneratedAnswer {
                question: row.question.clone(),
                answer: answer.answer,
            });
        }

        GenerationReport { rows }
    }
}

/// A question with its generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub question: String,
    pub answer: String,
}

/// Output of [`RagPipeline::generate_answers`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub rows: Vec<GeneratedAnswer>,
}

impl GenerationReport {
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Mean answer length in characters.
    pub fn avg_answer_len(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let total: usize = self.rows.iter().map(|r| r.answer.chars().count()).sum();
        total as f64 / self.rows.len() as f64
    }

    /// Rows with a non-empty answer.
    pub fn completed(&self) -> usize {
        self.rows.iter().filter(|r| !r.answer.is_empty()).count()
    }

    pub fn print_summary(&self) {
        println!("\n========== Generation Summary ==========");
        println!("Total Questions:   {}", self.total());
        println!("Avg Answer Length: {:.0} chars", self.avg_answer_len());
        println!("Completed:         {}/{}", self.completed(), self.total());
        println!("========================================\n");
    }
}

/// What an ingestion run produced.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Files whose text made it into the collection.
    pub files: Vec<String>,
    /// Extracted text per file.
    pub documents: Vec<Document>,
    /// Files that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    pub chunks: usize,
}

/// Extracts, splits, embeds and stores documents.
pub struct Ingestor<'a> {
    pub loader: &'a DocumentLoader,
    pub splitter: &'a TextSplitter,
    pub embedder: &'a dyn Embedder,
    pub store: &'a dyn VectorStore,
}

impl Ingestor<'_> {
    /// Ingest `files` into `collection`, creating it if needed. Files that
    /// cannot be read are skipped; it is an error if none yield text.
    pub async fn ingest(&self, files: &[PathBuf], collection: &str) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for path in files {
            let name = source_name(path);
            match self.loader.load(path).await {
                Ok(doc) if doc.text.trim().is_empty() => {
                    tracing::warn!(file = %name, "no text extracted");
                    report.skipped.push((name, "no text extracted".to_string()));
                }
                Ok(doc) => {
                    tracing::info!(file = %name, chars = doc.text.len(), "Processed");
                    report.files.push(name);
                    report.documents.push(doc);
                }
                Err(e) => {
                    tracing::warn!(file = %name, "skipping: {}", e);
                    report.skipped.push((name, e.to_string()));
                }
            }
        }

        if report.documents.is_empty() {
            return Err(RagEvalError::InvalidInput(
                "No text extracted from uploaded files".to_string(),
            ));
        }

        let chunks = self.splitter.split_documents(&report.documents);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        let dimension = embeddings
            .first()
            .map(Vec::len)
            .unwrap_or_else(|| self.embedder.dimension());

        self.store.ensure_collection(collection, dimension).await?;
        report.chunks = self.store.insert(collection, &chunks, &embeddings).await?;

        tracing::info!(
            collection,
            chunks = report.chunks,
            documents = report.documents.len(),
            "ingestion complete"
        );
        Ok(report)
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}
