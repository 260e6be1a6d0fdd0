//! Evaluation rows and the bundled sample data.

use serde::{Deserialize, Serialize};

/// One row of evaluation data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvalRow {
    pub question: String,
    pub ground_truth: String,
    /// Prior conversation; empty when the row has none.
    pub chat_history: String,
}

impl EvalRow {
    pub fn new(question: &str, ground_truth: &str, chat_history: &str) -> Self {
        Self {
            question: question.to_string(),
            ground_truth: ground_truth.to_string(),
            chat_history: chat_history.to_string(),
        }
    }
}

/// One row of a question-only sheet used for answer generation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionRow {
    pub question: String,
    pub chat_history: String,
}

const SAMPLE_ROWS: [(&str, &str, &str); 5] = [
    (
        "What is the company refund policy?",
        "The company offers a 30-day money-back guarantee on all products. Customers can request a full refund within 30 days of purchase by contacting customer support with their order number.",
        "",
    ),
    (
        "How do I reset my password?",
        "To reset your password, click on the \"Forgot Password\" link on the login page. Enter your registered email address and follow the instructions sent to your email to create a new password.",
        "User: I forgot my login credentials. Assistant: I can help you with that. Are you having trouble with your username or password?",
    ),
    (
        "What are the system requirements for the software?",
        "The minimum system requirements are: Windows 10 or macOS 10.14, 8GB RAM, 2GHz processor, and 10GB free disk space. For optimal performance, we recommend 16GB RAM and an SSD.",
        "User: I want to install your software. Assistant: Great! I can help you with the installation process.",
    ),
    (
        "Can you explain the pricing tiers?",
        "We offer three pricing tiers: Basic ($9/month) with core features, Professional ($29/month) with advanced features and priority support, and Enterprise (custom pricing) with unlimited access and dedicated support.",
        "",
    ),
    (
        "How do I contact customer support?",
        "You can contact customer support via email at support@company.com, through the live chat on our website (available 9 AM - 6 PM EST), or by calling 1-800-XXX-XXXX during business hours.",
        "User: I have been having issues with my account. Assistant: I understand you're experiencing issues. Could you tell me more about the specific problem?",
    ),
];

/// Rows written to the evaluation template.
pub fn sample_eval_rows() -> Vec<EvalRow> {
    SAMPLE_ROWS
        .iter()
        .map(|(q, gt, history)| EvalRow::new(q, gt, history))
        .collect()
}

/// Questions written to the generation template.
pub fn sample_questions() -> Vec<QuestionRow> {
    SAMPLE_ROWS
        .iter()
        .map(|(q, _, _)| QuestionRow {
            question: q.to_string(),
            chat_history: String::new(),
        })
        .collect()
}

/// Summary shown after loading evaluation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStatistics {
    pub total_questions: usize,
    /// Mean length in characters.
    pub avg_question_len: f64,
    pub avg_ground_truth_len: f64,
    pub with_chat_history: usize,
}

impl DataStatistics {
    pub fn from_rows(rows: &[EvalRow]) -> Self {
        let mean = |lengths: Vec<usize>| {
            if lengths.is_empty() {
                0.0
            } else {
                lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
            }
        };
        Self {
            total_questions: rows.len(),
            avg_question_len: mean(rows.iter().map(|r| r.question.chars().count()).collect()),
            avg_ground_truth_len: mean(
                rows.iter()
                    .map(|r| r.ground_truth.chars().count())
                    .collect(),
            ),
            with_chat_history: rows
                .iter()
                .filter(|r| !r.chat_history.trim().is_empty())
                .count(),
        }
    }

    /// Print to stdout.
    pub fn print(&self) {
        println!("Total Questions:         {}", self.total_questions);
        println!("Avg Question Length:     {:.0} chars", self.avg_question_len);
        println!("Avg Ground Truth Length: {:.0} chars", self.avg_ground_truth_len);
        println!(
            "Questions with History:  {}/{}",
            self.with_chat_history, self.total_questions
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data() {
        let rows = sample_eval_rows();
        assert_eq!(rows.len(), 5);
        assert!(rows[0].chat_history.is_empty());
        assert!(rows[1].chat_history.starts_with("User: I forgot"));

        let questions = sample_questions();
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[3].question, "Can you explain the pricing tiers?");
    }

    #[test]
    fn test_statistics() {
        let rows = vec![
            EvalRow::new("abcd", "xy", ""),
            EvalRow::new("ab", "wxyz", "User: hi"),
        ];
        let stats = DataStatistics::from_rows(&rows);
        assert_eq!(stats.total_questions, 2);
        assert_eq!(stats.avg_question_len, 3.0);
        assert_eq!(stats.avg_ground_truth_len, 3.0);
        assert_eq!(stats.with_chat_history, 1);

        let empty = DataStatistics::from_rows(&[]);
        assert_eq!(empty.avg_question_len, 0.0);
    }
}
