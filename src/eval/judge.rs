//! LLM-as-Judge scoring of RAG responses.

use super::metrics::MetricSet;
use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::{ChatModel, create_chat_model};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Score given when the judge's output has no usable value.
const NEUTRAL_SCORE: f64 = 5.0;

/// Characters of an unparseable response kept in the recommendations.
const RAW_RESPONSE_PREVIEW: usize = 500;

static JSON_PATTERNS: LazyLock<Vec<(Regex, usize)>> = LazyLock::new(|| {
    [
        (r"(?s)```json\s*\n(.*?)\n```", 1),
        (r"(?s)```json\n(.*?)```", 1),
        (r"(?s)```\n(.*?)\n```", 1),
        (r"(?s)\{.*\}", 0),
    ]
    .into_iter()
    .filter_map(|(pattern, group)| Regex::new(pattern).ok().map(|re| (re, group)))
    .collect()
});

/// Score and explanation for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub id: String,
    /// 0 to 10.
    pub score: f64,
    pub explanation: String,
}

/// The judge's verdict on one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub overall_score: f64,
    /// Per-metric scores in metric order, followed by any extra metrics the
    /// judge volunteered.
    pub metrics: Vec<MetricScore>,
    pub summary: String,
    pub recommendations: String,
}

impl Evaluation {
    pub fn metric(&self, id: &str) -> Option<&MetricScore> {
        self.metrics.iter().find(|m| m.id == id)
    }

    /// Zero-score evaluation recorded when the judge could not be called.
    pub fn from_error(error: &str, metrics: &MetricSet) -> Self {
        Self {
            overall_score: 0.0,
            metrics: metrics
                .ids()
                .map(|id| MetricScore {
                    id: id.to_string(),
                    score: 0.0,
                    explanation: format!("Evaluation error: {}", error),
                })
                .collect(),
            summary: format!("Error during evaluation: {}", error),
            recommendations: String::new(),
        }
    }
}

/// Everything the judge sees about one question.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub question: &'a str,
    pub response: &'a str,
    pub ground_truth: &'a str,
    pub retrieved_chunks: &'a [String],
    pub chat_history: &'a str,
}

/// LLM-as-Judge for evaluating answer quality.
pub struct LlmJudge {
    model: Box<dyn ChatModel>,
}

impl LlmJudge {
    /// Create a new judge with the given chat model.
    pub fn new(model: Box<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Create from LLM config.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(create_chat_model(config)?))
    }

    pub fn describe(&self) -> String {
        self.model.describe()
    }

    /// Score `input` against every metric in `metrics`. Provider errors are
    /// folded into a zero-score evaluation instead of being returned.
    pub async fn evaluate(&self, input: &JudgeInput<'_>, metrics: &MetricSet) -> Evaluation {
        let prompt = build_prompt(input, metrics);
        match self.model.complete(None, &prompt).await {
            Ok(raw) => parse_evaluation(&raw, metrics),
            Err(e) => {
                tracing::warn!(judge = %self.model.describe(), "evaluation failed: {}", e);
                Evaluation::from_error(&e.to_string(), metrics)
            }
        }
    }
}

/// Render the judge prompt.
pub fn build_prompt(input: &JudgeInput<'_>, metrics: &MetricSet) -> String {
    let chunks_text = input
        .retrieved_chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("Chunk {}: {}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n");

    let metrics_description = metrics
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. **{}**: {}", i + 1, m.name, m.description))
        .collect::<Vec<_>>()
        .join("\n\n");

    let chat_history_section = if input.chat_history.trim().is_empty() {
        String::new()
    } else {
        format!("\n## Chat History\n{}\n", input.chat_history)
    };

    let metric_format = metrics
        .ids()
        .map(|id| {
            format!(
                "        \"{}\": {{\n            \"score\": <0-10>,\n            \"explanation\": \"<detailed explanation>\"\n        }}",
                id
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"You are an expert evaluator tasked with assessing the quality of LLM responses in a RAG (Retrieval-Augmented Generation) system.

## Task Context
- **Question**: {question}
- **LLM Response**: {response}
- **Ground Truth**: {ground_truth}
{chat_history_section}
## Retrieved Context Chunks
{chunks_text}

## Evaluation Metrics
Please evaluate the response based on the following metrics:

{metrics_description}

## Evaluation Instructions
1. For each metric, provide:
   - A score from 0 to 10 (where 0 is completely failing and 10 is perfect)
   - A brief explanation for your score
   - Specific examples from the response that support your evaluation

2. Consider the following in your evaluation:
   - How well the response aligns with the ground truth
   - Whether the response uses information from the retrieved chunks appropriately
   - The overall quality and usefulness of the response
   - Any issues with factual accuracy, relevance, or appropriateness
   - For engagement metric, consider how well the response maintains conversation flow with the chat history

3. Be objective and specific in your evaluation. Point to concrete examples in the response.

## Output Format
Please structure your evaluation as follows:

```json
{{
    "overall_score": <weighted average of all scores>,
    "metrics": {{
{metric_format}
    }},
    "summary": "<brief overall assessment of the response quality>",
    "recommendations": "<suggestions for improvement>"
}}
```

Ensure your evaluation is thorough, fair, and provides actionable insights."#,
        question = input.question,
        response = input.response,
        ground_truth = input.ground_truth,
    )
}

/// Find the first JSON object in a judge response.
fn extract_json(response: &str) -> Option<serde_json::Map<String, Value>> {
    for (re, group) in JSON_PATTERNS.iter() {
        let candidate = re
            .captures(response)
            .and_then(|caps| caps.get(*group))
            .map(|m| m.as_str().trim());
        if let Some(Ok(Value::Object(map))) = candidate.map(serde_json::from_str::<Value>) {
            return Some(map);
        }
    }
    match serde_json::from_str::<Value>(response.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a raw judge response into an [`Evaluation`], filling every gap with
/// neutral defaults.
pub fn parse_evaluation(response: &str, metrics: &MetricSet) -> Evaluation {
    let Some(object) = extract_json(response) else {
        tracing::warn!("Could not parse the judge response. Creating default evaluation.");
        let preview: String = response.chars().take(RAW_RESPONSE_PREVIEW).collect();
        return Evaluation {
            overall_score: NEUTRAL_SCORE,
            metrics: metrics
                .ids()
                .map(|id| not_evaluated(id))
                .collect(),
            summary: "Failed to parse complete evaluation".to_string(),
            recommendations: format!("Raw response (first 500 chars): {}", preview),
        };
    };

    let reported = object
        .get("metrics")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let read = |id: &str, value: &Value| MetricScore {
        id: id.to_string(),
        score: value.get("score").and_then(as_score).unwrap_or(NEUTRAL_SCORE),
        explanation: value.get("explanation").map(as_text).unwrap_or_default(),
    };

    let mut scores: Vec<MetricScore> = metrics
        .ids()
        .map(|id| match reported.get(id) {
            Some(value) => read(id, value),
            None => not_evaluated(id),
        })
        .collect();
    for (id, value) in &reported {
        if metrics.get(id).is_none() {
            scores.push(read(id, value));
        }
    }

    let overall_score = object
        .get("overall_score")
        .and_then(as_score)
        .unwrap_or_else(|| mean_score(&scores));

    Evaluation {
        overall_score,
        metrics: scores,
        summary: object
            .get("summary")
            .map(as_text)
            .unwrap_or_else(|| "Evaluation completed with parsing issues".to_string()),
        recommendations: object
            .get("recommendations")
            .map(as_text)
            .unwrap_or_else(|| "Review the raw response for complete details".to_string()),
    }
}

fn not_evaluated(id: &str) -> MetricScore {
    MetricScore {
        id: id.to_string(),
        score: NEUTRAL_SCORE,
        explanation: "Metric not evaluated or parsing failed".to_string(),
    }
}

fn mean_score(scores: &[MetricScore]) -> f64 {
    if scores.is_empty() {
        return NEUTRAL_SCORE;
    }
    scores.iter().map(|m| m.score).sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagEvalError;
    use crate::eval::metrics::Metric;
    use crate::llm::{LlmResponse, Message};
    use async_trait::async_trait;

    struct Scripted(std::result::Result<String, String>);

    #[async_trait]
    impl ChatModel for Scripted {
        async fn chat(&self, _messages: Vec<Message>) -> Result<LlmResponse> {
            match &self.0 {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    finish_reason: None,
                    usage: None,
                }),
                Err(e) => Err(RagEvalError::LlmApi(e.clone())),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn input<'a>(chunks: &'a [String], history: &'a str) -> JudgeInput<'a> {
        JudgeInput {
            question: "What is the refund window?",
            response: "30 days.",
            ground_truth: "30-day money-back guarantee.",
            retrieved_chunks: chunks,
            chat_history: history,
        }
    }

    #[test]
    fn test_prompt_lists_chunks_and_metrics() {
        let chunks = vec!["Refunds within 30 days.".to_string(), "Contact support.".to_string()];
        let custom = vec![Metric::custom("Tone Check", "Is it polite?").unwrap()];
        let metrics = MetricSet::with_custom(&custom);
        let prompt = build_prompt(&input(&chunks, ""), &metrics);

        assert!(prompt.contains("- **Ground Truth**: 30-day money-back guarantee.\n\n## Retrieved Context Chunks"));
        assert!(prompt.contains("Chunk 1: Refunds within 30 days.\n\nChunk 2: Contact support."));
        assert!(prompt.contains("1. **Answer Relevancy**:"));
        assert!(prompt.contains("9. **Tone Check**: Is it polite?"));
        assert!(prompt.contains("\"tone_check\": {"));
        assert!(!prompt.contains("## Chat History"));
        assert!(prompt.ends_with("provides actionable insights."));
    }

    #[test]
    fn test_prompt_includes_chat_history() {
        let prompt = build_prompt(&input(&[], "User: hi Assistant: hello"), &MetricSet::default());
        assert!(prompt.contains("\n## Chat History\nUser: hi Assistant: hello\n\n## Retrieved"));
    }

    #[test]
    fn test_parse_fenced_response() {
        let response = "Here you go:\n```json\n{\"overall_score\": 8.5, \"metrics\": {\"correctness\": {\"score\": 9, \"explanation\": \"Accurate\"}}, \"summary\": \"Good\", \"recommendations\": \"None\"}\n```";
        let eval = parse_evaluation(response, &MetricSet::default());

        assert_eq!(eval.overall_score, 8.5);
        assert_eq!(eval.metrics.len(), 8);
        assert_eq!(eval.metric("correctness").unwrap().score, 9.0);
        let missing = eval.metric("engagement").unwrap();
        assert_eq!(missing.score, 5.0);
        assert_eq!(missing.explanation, "Metric not evaluated or parsing failed");
        assert_eq!(eval.summary, "Good");
    }

    #[test]
    fn test_parse_raw_object_fills_defaults() {
        let response = r#"Sure. {"metrics": {"correctness": {"score": "6", "explanation": "ok"}, "bonus": {"score": 2}}} Thanks."#;
        let eval = parse_evaluation(response, &MetricSet::default());

        // seven neutral defaults, one 6, one volunteered 2
        assert_eq!(eval.metrics.len(), 9);
        assert_eq!(eval.metrics.last().unwrap().id, "bonus");
        assert!((eval.overall_score - (5.0 * 7.0 + 6.0 + 2.0) / 9.0).abs() < 1e-9);
        assert_eq!(eval.summary, "Evaluation completed with parsing issues");
        assert_eq!(eval.recommendations, "Review the raw response for complete details");
    }

    #[test]
    fn test_parse_garbage_response() {
        let garbage = "x".repeat(600);
        let eval = parse_evaluation(&garbage, &MetricSet::default());

        assert_eq!(eval.overall_score, 5.0);
        assert_eq!(eval.summary, "Failed to parse complete evaluation");
        assert_eq!(
            eval.recommendations,
            format!("Raw response (first 500 chars): {}", "x".repeat(500))
        );
        assert!(eval.metrics.iter().all(|m| m.score == 5.0));
    }

    #[tokio::test]
    async fn test_judge_error_gives_zero_scores() {
        let judge = LlmJudge::new(Box::new(Scripted(Err("boom".to_string()))));
        let eval = judge.evaluate(&input(&[], ""), &MetricSet::default()).await;

        assert_eq!(eval.overall_score, 0.0);
        assert_eq!(eval.summary, "Error during evaluation: LLM API error: boom");
        assert!(eval.recommendations.is_empty());
        assert!(eval.metrics.iter().all(|m| m.score == 0.0
            && m.explanation == "Evaluation error: LLM API error: boom"));
    }

    #[tokio::test]
    async fn test_judge_parses_model_output() {
        let judge = LlmJudge::new(Box::new(Scripted(Ok(
            r#"{"overall_score": 7, "summary": "fine", "recommendations": "more detail"}"#.to_string(),
        ))));
        let eval = judge.evaluate(&input(&[], ""), &MetricSet::default()).await;
        assert_eq!(eval.overall_score, 7.0);
        assert_eq!(eval.recommendations, "more detail");
    }
}
