//! Evaluation of RAG answers.
//!
//! This module provides:
//! - Built-in and custom evaluation metrics
//! - LLM-as-judge scoring with tolerant response parsing
//! - Evaluation rows and bundled sample data
//! - The runner that answers each question and judges the answer

pub mod dataset;
pub mod judge;
pub mod metrics;
pub mod runner;

pub use dataset::{DataStatistics, EvalRow, QuestionRow, sample_eval_rows, sample_questions};
pub use judge::{Evaluation, JudgeInput, LlmJudge, MetricScore};
pub use metrics::{Metric, MetricSet, add_custom_metric, metric_id, remove_custom_metric};
pub use runner::{EvaluationReport, EvaluationResult, EvaluationRunner, SortBy, select_results};
