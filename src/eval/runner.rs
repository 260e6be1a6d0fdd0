//! Evaluation runner: answer each question with RAG, then judge the answer.

use super::dataset::EvalRow;
use super::judge::{Evaluation, JudgeInput, LlmJudge};
use super::metrics::MetricSet;
use crate::error::{RagEvalError, Result};
use crate::rag::{RagPipeline, preview};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

/// One evaluated question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub question: String,
    pub ground_truth: String,
    pub chat_history: String,
    /// The RAG answer that was judged.
    pub response: String,
    pub retrieved_chunks: Vec<String>,
    pub evaluation: Evaluation,
    /// `"<provider> - <model>"` that produced the response.
    pub model: String,
    pub collection: String,
    pub timestamp: DateTime<Utc>,
}

/// Results of a run with per-metric averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub results: Vec<EvaluationResult>,
    /// `(metric id, mean score)` in metric order.
    pub averages: Vec<(String, f64)>,
    pub total_time_secs: f64,
}

impl EvaluationReport {
    /// Build a report, averaging each metric over all results. A result
    /// without a score for a metric counts as 0.
    pub fn new(results: Vec<EvaluationResult>, metrics: &MetricSet, total_time_secs: f64) -> Self {
        let averages = metrics
            .ids()
            .map(|id| {
                let avg = if results.is_empty() {
                    0.0
                } else {
                    results
                        .iter()
                        .map(|r| r.evaluation.metric(id).map_or(0.0, |m| m.score))
                        .sum::<f64>()
                        / results.len() as f64
                };
                (id.to_string(), avg)
            })
            .collect();
        Self {
            results,
            averages,
            total_time_secs,
        }
    }

    /// Mean overall score; 0 without results.
    pub fn average_overall(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.results
            .iter()
            .map(|r| r.evaluation.overall_score)
            .sum::<f64>()
            / self.results.len() as f64
    }

    /// Print summary to stdout.
    pub fn print_summary(&self, metrics: &MetricSet) {
        println!("\n========== Evaluation Results ==========");
        println!("Completed evaluation of {} questions", self.results.len());
        println!("----------------------------------------");
        println!("Average Scores");
        for (id, avg) in &self.averages {
            let name = metrics.get(id).map_or(id.as_str(), |m| m.name.as_str());
            println!("  {:<24} {:.2}/10", name, avg);
        }
        println!("----------------------------------------");
        println!("Overall:                   {:.2}/10", self.average_overall());
        println!("Total time: {:.1}s", self.total_time_secs);
        println!("========================================\n");
    }
}

/// Runs RAG generation and judging over evaluation rows.
pub struct EvaluationRunner {
    pipeline: RagPipeline,
    judge: LlmJudge,
    metrics: MetricSet,
}

impl EvaluationRunner {
    pub fn new(pipeline: RagPipeline, judge: LlmJudge, metrics: MetricSet) -> Self {
        Self {
            pipeline,
            judge,
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    /// Evaluate the first `limit` rows (all when `None`).
    pub async fn run(&self, rows: &[EvalRow], limit: Option<usize>) -> Result<EvaluationReport> {
        if rows.is_empty() {
            return Err(RagEvalError::InvalidInput(
                "No evaluation data loaded".to_string(),
            ));
        }
        let start_time = Instant::now();
        let count = limit.unwrap_or(rows.len()).clamp(1, rows.len());
        let model = self.pipeline.model();

        tracing::info!(
            questions = count,
            model = %model,
            judge = %self.judge.describe(),
            collection = %self.pipeline.collection(),
            "starting evaluation"
        );

        let mut results = Vec::with_capacity(count);
        for (idx, row) in rows.iter().take(count).enumerate() {
            tracing::info!(
                "Processing question {}/{}: {}",
                idx + 1,
                count,
                preview(&row.question, 50)
            );

            let answer = self.pipeline.answer(&row.question, &row.chat_history).await;
            let retrieved_chunks = answer.retrieved_chunks();
            tracing::debug!(chunks = retrieved_chunks.len(), "generated response");

            let input = JudgeInput {
                question: &row.question,
                response: &answer.answer,
                ground_truth: &row.ground_truth,
                retrieved_chunks: &retrieved_chunks,
                chat_history: &row.chat_history,
            };
            let evaluation = self.judge.evaluate(&input, &self.metrics).await;
            tracing::info!(score = evaluation.overall_score, "evaluated question {}", idx + 1);

            results.push(EvaluationResult {
                question: row.question.clone(),
                ground_truth: row.ground_truth.clone(),
                chat_history: row.chat_history.clone(),
                response: answer.answer,
                retrieved_chunks,
                evaluation,
                model: model.clone(),
                collection: self.pipeline.collection().to_string(),
                timestamp: Utc::now(),
            });
        }

        Ok(EvaluationReport::new(
            results,
            &self.metrics,
            start_time.elapsed().as_secs_f64(),
        ))
    }
}

/// Ordering for displayed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Highest overall score first.
    #[default]
    OverallScore,
    /// Input order.
    Question,
    /// Newest first.
    Timestamp,
}

impl FromStr for SortBy {
    type Err = RagEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "score" | "overallscore" => Ok(SortBy::OverallScore),
            "question" => Ok(SortBy::Question),
            "timestamp" | "time" => Ok(SortBy::Timestamp),
            other => Err(RagEvalError::InvalidInput(format!(
                "Unknown sort order '{}'. Use score, question or timestamp",
                other
            ))),
        }
    }
}

/// Results with at least `min_score` overall, in `sort` order.
pub fn select_results(
    results: &[EvaluationResult],
    min_score: f64,
    sort: SortBy,
) -> Vec<&EvaluationResult> {
    let mut selected: Vec<&EvaluationResult> = results
        .iter()
        .filter(|r| r.evaluation.overall_score >= min_score)
        .collect();
    match sort {
        SortBy::OverallScore => selected.sort_by(|a, b| {
            b.evaluation
                .overall_score
                .total_cmp(&a.evaluation.overall_score)
        }),
        SortBy::Timestamp => selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SortBy::Question => {}
    }
    selected
}

/// Print one result in full.
pub fn print_result(
    number: usize,
    result: &EvaluationResult,
    metrics: &MetricSet,
    show_chunks: bool,
    show_chat_history: bool,
) {
    println!(
        "\nQuestion {}: {} (Score: {:.2})",
        number,
        preview(&result.question, 100),
        result.evaluation.overall_score
    );
    println!(
        "Collection: {}  Model: {}  At: {}",
        result.collection,
        result.model,
        result.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!("\nQuestion:\n  {}", result.question);
    println!("Ground Truth:\n  {}", result.ground_truth);
    if show_chat_history && !result.chat_history.is_empty() {
        println!("Chat History:\n  {}", result.chat_history);
    }
    println!("Model Response:\n  {}", result.response);

    println!("\nEvaluation Scores:");
    for score in &result.evaluation.metrics {
        let name = metrics.get(&score.id).map_or(score.id.as_str(), |m| m.name.as_str());
        println!("  {}: {}/10", name, score.score);
        if !score.explanation.is_empty() {
            println!("    {}", score.explanation);
        }
    }
    println!("\nSummary:\n  {}", result.evaluation.summary);
    println!("Recommendations:\n  {}", result.evaluation.recommendations);

    if show_chunks {
        for (i, chunk) in result.retrieved_chunks.iter().enumerate() {
            println!("\n--- Chunk {} ---\n{}", i + 1, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::embed::Embedder;
    use crate::eval::judge::MetricScore;
    use crate::llm::{ChatModel, LlmResponse, Message};
    use crate::store::{MemoryStore, VectorStore};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct Canned(&'static str, &'static str);

    #[async_trait]
    impl ChatModel for Canned {
        async fn chat(&self, _messages: Vec<Message>) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.1.to_string(),
                finish_reason: None,
                usage: None,
            })
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn result(question: &str, score: f64, minute: u32) -> EvaluationResult {
        EvaluationResult {
            question: question.to_string(),
            ground_truth: String::new(),
            chat_history: String::new(),
            response: String::new(),
            retrieved_chunks: Vec::new(),
            evaluation: Evaluation {
                overall_score: score,
                metrics: vec![MetricScore {
                    id: "correctness".to_string(),
                    score,
                    explanation: String::new(),
                }],
                summary: String::new(),
                recommendations: String::new(),
            },
            model: "m".to_string(),
            collection: "c".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_averages_treat_missing_as_zero() {
        let results = vec![result("a", 8.0, 0), result("b", 6.0, 1)];
        let report = EvaluationReport::new(results, &MetricSet::default(), 1.0);

        assert_eq!(report.averages.len(), 8);
        let correctness = report.averages.iter().find(|(id, _)| id == "correctness").unwrap();
        assert_eq!(correctness.1, 7.0);
        let engagement = report.averages.iter().find(|(id, _)| id == "engagement").unwrap();
        assert_eq!(engagement.1, 0.0);
        assert_eq!(report.average_overall(), 7.0);
    }

    #[test]
    fn test_select_results() {
        let results = vec![result("a", 4.0, 0), result("b", 9.0, 1), result("c", 6.0, 2)];

        let by_score: Vec<&str> = select_results(&results, 5.0, SortBy::OverallScore)
            .iter()
            .map(|r| r.question.as_str())
            .collect();
        assert_eq!(by_score, vec!["b", "c"]);

        let by_time: Vec<&str> = select_results(&results, 0.0, SortBy::Timestamp)
            .iter()
            .map(|r| r.question.as_str())
            .collect();
        assert_eq!(by_time, vec!["c", "b", "a"]);

        assert_eq!(select_results(&results, 0.0, SortBy::Question)[0].question, "a");
    }

    #[test]
    fn test_sort_by_parsing() {
        assert_eq!("Overall Score".parse::<SortBy>().unwrap(), SortBy::OverallScore);
        assert_eq!("timestamp".parse::<SortBy>().unwrap(), SortBy::Timestamp);
        assert!("length".parse::<SortBy>().is_err());
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let store = MemoryStore::new();
        store.ensure_collection("docs", 2).await.unwrap();
        let chunk = Chunk {
            text: "Refunds within 30 days.".to_string(),
            source: "policy.txt".to_string(),
            index: 0,
        };
        store.insert("docs", &[chunk], &[vec![1.0, 0.0]]).await.unwrap();

        let pipeline = RagPipeline::new(
            Box::new(Canned("Test - answerer", "30 days.")),
            Box::new(FixedEmbedder),
            Box::new(store),
            "docs",
            4,
        );
        let judge = LlmJudge::new(Box::new(Canned(
            "Test - judge",
            r#"{"overall_score": 9, "metrics": {"correctness": {"score": 10, "explanation": "exact"}}}"#,
        )));
        let runner = EvaluationRunner::new(pipeline, judge, MetricSet::default());

        let rows = vec![
            EvalRow::new("Refund window?", "30 days", ""),
            EvalRow::new("Second?", "n/a", ""),
        ];
        let report = runner.run(&rows, Some(1)).await.unwrap();

        assert_eq!(report.results.len(), 1);
        let first = &report.results[0];
        assert_eq!(first.response, "30 days.");
        assert_eq!(first.retrieved_chunks, vec!["Refunds within 30 days."]);
        assert_eq!(first.model, "Test - answerer");
        assert_eq!(first.collection, "docs");
        assert_eq!(first.evaluation.overall_score, 9.0);
        assert_eq!(first.evaluation.metric("correctness").unwrap().score, 10.0);

        assert!(runner.run(&[], None).await.is_err());
    }
}
