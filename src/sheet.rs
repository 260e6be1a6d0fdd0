//! Excel input and output.
//!
//! Evaluation data and question lists are read from the first sheet of an
//! `.xlsx`/`.xls` workbook with a header row. Templates, evaluation results
//! and generated answers are written as `.xlsx`.

use crate::error::{RagEvalError, Result};
use crate::eval::{EvalRow, EvaluationResult, MetricSet, QuestionRow, sample_eval_rows, sample_questions};
use crate::rag::GenerationReport;
use calamine::{Data, Reader, open_workbook_auto};
use chrono::Local;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

pub const QUESTION: &str = "Question";
pub const GROUND_TRUTH: &str = "Ground truth";
pub const CHAT_HISTORY: &str = "Chat history";

/// Header row and data rows of a sheet, as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require(&self, required: &[&str]) -> Result<()> {
        if required.iter().all(|name| self.column(name).is_some()) {
            return Ok(());
        }
        Err(RagEvalError::InvalidInput(format!(
            "Excel file must contain columns: {}. Found columns: {}",
            required.join(", "),
            self.headers.join(", ")
        )))
    }

    /// Cell text, empty when the column is absent or the row is short.
    fn cell<'a>(&self, row: &'a [String], column: Option<usize>) -> &'a str {
        column
            .and_then(|idx| row.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Read the first sheet of `path`. Rows with no text are dropped.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| RagEvalError::Spreadsheet(format!("{} has no sheets", path.display())))?;
    let range = workbook.worksheet_range(&first)?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|header| header.iter().map(cell_text).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    Ok(Table { headers, rows })
}

/// Read evaluation data. `Question` and `Ground truth` are required; a
/// missing `Chat history` column or blank cell reads as empty.
pub fn read_eval_rows(path: &Path) -> Result<Vec<EvalRow>> {
    let table = read_table(path)?;
    table.require(&[QUESTION, GROUND_TRUTH])?;

    let question = table.column(QUESTION);
    let ground_truth = table.column(GROUND_TRUTH);
    let history = table.column(CHAT_HISTORY);
    if history.is_none() {
        tracing::info!("No 'Chat history' column found - proceeding without chat history context");
    }

    Ok(table
        .rows
        .iter()
        .filter(|row| !table.cell(row, question).is_empty())
        .map(|row| EvalRow {
            question: table.cell(row, question).to_string(),
            ground_truth: table.cell(row, ground_truth).to_string(),
            chat_history: table.cell(row, history).to_string(),
        })
        .collect())
}

/// Read questions for answer generation. Only `Question` is required.
pub fn read_questions(path: &Path) -> Result<Vec<QuestionRow>> {
    let table = read_table(path)?;
    table.require(&[QUESTION])?;

    let question = table.column(QUESTION);
    let history = table.column(CHAT_HISTORY);

    Ok(table
        .rows
        .iter()
        .filter(|row| !table.cell(row, question).is_empty())
        .map(|row| QuestionRow {
            question: table.cell(row, question).to_string(),
            chat_history: table.cell(row, history).to_string(),
        })
        .collect())
}

/// Most characters an Excel cell accepts.
const MAX_CELL_CHARS: usize = 32_767;

const TRUNCATED_MARKER: &str = "... [truncated]";

/// `text` cut to fit one cell, ending with a marker when shortened.
fn fit_cell(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_CELL_CHARS {
        return Cow::Borrowed(text);
    }
    let keep = MAX_CELL_CHARS - TRUNCATED_MARKER.chars().count();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(TRUNCATED_MARKER);
    Cow::Owned(cut)
}

/// A workbook with one named sheet and a bold header row.
struct SheetWriter {
    workbook: Workbook,
    row: u32,
}

impl SheetWriter {
    fn new(sheet_name: &str, headers: &[String]) -> Result<Self> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, header, &bold)?;
            sheet.set_column_width(col as u16, 30)?;
        }
        Ok(Self { workbook, row: 1 })
    }

    fn sheet(&mut self) -> Result<&mut Worksheet> {
        Ok(self.workbook.worksheet_from_index(0)?)
    }

    fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        let row = self.row;
        let sheet = self.sheet()?;
        for (col, cell) in cells.iter().enumerate() {
            match cell {
                Cell::Text(text) => sheet.write_string(row, col as u16, fit_cell(text))?,
                Cell::Number(n) => sheet.write_number(row, col as u16, *n)?,
            };
        }
        self.row += 1;
        Ok(())
    }

    fn save(mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RagEvalError::io(parent, e))?;
            }
        }
        self.workbook.save(path)?;
        tracing::debug!(path = %path.display(), rows = self.row - 1, "wrote workbook");
        Ok(())
    }
}

enum Cell {
    Text(String),
    Number(f64),
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Sample evaluation data in sheet "Evaluation Data".
pub fn write_eval_template(path: &Path) -> Result<()> {
    let mut writer = SheetWriter::new("Evaluation Data", &headers(&[QUESTION, GROUND_TRUTH, CHAT_HISTORY]))?;
    for row in sample_eval_rows() {
        writer.write_row(&[
            Cell::Text(row.question),
            Cell::Text(row.ground_truth),
            Cell::Text(row.chat_history),
        ])?;
    }
    writer.save(path)
}

/// Sample questions in sheet "Questions".
pub fn write_questions_template(path: &Path) -> Result<()> {
    let mut writer = SheetWriter::new("Questions", &headers(&[QUESTION]))?;
    for row in sample_questions() {
        writer.write_row(&[Cell::Text(row.question)])?;
    }
    writer.save(path)
}

/// Metric ids for the export columns: the active metrics, then any other
/// metric found in the results.
fn export_metric_ids(results: &[EvaluationResult], metrics: &MetricSet) -> Vec<String> {
    let mut ids: Vec<String> = metrics.ids().map(str::to_string).collect();
    for result in results {
        for score in &result.evaluation.metrics {
            if !ids.contains(&score.id) {
                ids.push(score.id.clone());
            }
        }
    }
    ids
}

/// Write results to sheet "Evaluation Results".
pub fn export_results(results: &[EvaluationResult], metrics: &MetricSet, path: &Path) -> Result<()> {
    let ids = export_metric_ids(results, metrics);
    let mut columns = headers(&[
        "Question",
        "Ground Truth",
        "Chat History",
        "Model Response",
        "Overall Score",
        "Model",
        "Collection",
        "Timestamp",
    ]);
    for id in &ids {
        let name = metrics.get(id).map_or(id.as_str(), |m| m.name.as_str());
        columns.push(format!("{} Score", name));
        columns.push(format!("{} Explanation", name));
    }

    let mut writer = SheetWriter::new("Evaluation Results", &columns)?;
    for result in results {
        let mut cells = vec![
            Cell::Text(result.question.clone()),
            Cell::Text(result.ground_truth.clone()),
            Cell::Text(result.chat_history.clone()),
            Cell::Text(result.response.clone()),
            Cell::Number(result.evaluation.overall_score),
            Cell::Text(result.model.clone()),
            Cell::Text(result.collection.clone()),
            Cell::Text(result.timestamp.with_timezone(&Local).to_rfc3339()),
        ];
        for id in &ids {
            match result.evaluation.metric(id) {
                Some(score) => {
                    cells.push(Cell::Number(score.score));
                    cells.push(Cell::Text(score.explanation.clone()));
                }
                None => {
                    cells.push(Cell::Text(String::new()));
                    cells.push(Cell::Text(String::new()));
                }
            }
        }
        writer.write_row(&cells)?;
    }
    writer.save(path)
}

/// Write generated answers to sheet "Questions and Answers". The answer goes
/// in the `Chat history` column so the file can seed a follow-up run.
pub fn export_answers(report: &GenerationReport, path: &Path) -> Result<()> {
    let mut writer = SheetWriter::new("Questions and Answers", &headers(&[QUESTION, CHAT_HISTORY]))?;
    for row in &report.rows {
        writer.write_row(&[Cell::Text(row.question.clone()), Cell::Text(row.answer.clone())])?;
    }
    writer.save(path)
}

fn timestamped(prefix: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.xlsx",
        prefix,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// `llm_evaluation_results_YYYYMMDD_HHMMSS.xlsx`
pub fn default_results_filename() -> PathBuf {
    timestamped("llm_evaluation_results")
}

/// `rag_generated_answers_YYYYMMDD_HHMMSS.xlsx`
pub fn default_answers_filename() -> PathBuf {
    timestamped("rag_generated_answers")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Evaluation, MetricScore, Metric};
    use crate::rag::GeneratedAnswer;
    use chrono::Utc;
    use tempfile::TempDir;

    fn write_sheet(path: &Path, rows: &[&[&str]]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_eval_template_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluation_template.xlsx");
        write_eval_template(&path).unwrap();

        let rows = read_eval_rows(&path).unwrap();
        assert_eq!(rows, sample_eval_rows());

        let questions = read_questions(&path).unwrap();
        assert_eq!(questions.len(), 5);
        assert!(questions[1].chat_history.starts_with("User: I forgot"));
    }

    #[test]
    fn test_missing_required_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.xlsx");
        write_sheet(&path, &[&["Query", "Answer"], &["q", "a"]]);

        let err = read_eval_rows(&path).unwrap_err().to_string();
        assert!(err.contains("Question, Ground truth"));
        assert!(err.contains("Found columns: Query, Answer"));
        assert!(read_questions(&path).is_err());
    }

    #[test]
    fn test_missing_chat_history_and_blank_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.xlsx");
        write_sheet(
            &path,
            &[
                &["Question", "Ground truth"],
                &["Q1", "A1"],
                &["", ""],
                &["Q2", "A2"],
            ],
        );

        let rows = read_eval_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], EvalRow::new("Q2", "A2", ""));
    }

    #[test]
    fn test_export_results_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        let custom = vec![Metric::custom("Tone", "Polite?").unwrap()];
        let metrics = MetricSet::with_custom(&custom);
        let result = EvaluationResult {
            question: "Q".to_string(),
            ground_truth: "GT".to_string(),
            chat_history: String::new(),
            response: "R".to_string(),
            retrieved_chunks: Vec::new(),
            evaluation: Evaluation {
                overall_score: 7.5,
                metrics: vec![MetricScore {
                    id: "tone".to_string(),
                    score: 6.0,
                    explanation: "ok".to_string(),
                }],
                summary: String::new(),
                recommendations: String::new(),
            },
            model: "OpenAI - gpt-4o".to_string(),
            collection: "docs".to_string(),
            timestamp: Utc::now(),
        };
        export_results(&[result], &metrics, &path).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.headers.len(), 8 + 2 * 9);
        assert_eq!(table.headers[4], "Overall Score");
        assert_eq!(table.headers[8], "Answer Relevancy Score");
        let tone = table.column("Tone Score").unwrap();
        assert_eq!(table.rows[0][tone], "6");
        assert_eq!(table.rows[0][tone + 1], "ok");
        assert_eq!(table.rows[0][4], "7.5");
    }

    #[test]
    fn test_export_answers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("answers.xlsx");
        let report = GenerationReport {
            rows: vec![GeneratedAnswer {
                question: "Q".to_string(),
                answer: "A".to_string(),
            }],
        };
        export_answers(&report, &path).unwrap();

        let questions = read_questions(&path).unwrap();
        assert_eq!(questions, vec![QuestionRow {
            question: "Q".to_string(),
            chat_history: "A".to_string(),
        }]);
    }

    #[test]
    fn test_oversized_cells_are_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("answers.xlsx");
        let report = GenerationReport {
            rows: vec![GeneratedAnswer {
                question: "Q".to_string(),
                answer: "é".repeat(40_000),
            }],
        };
        export_answers(&report, &path).unwrap();

        let questions = read_questions(&path).unwrap();
        let answer = &questions[0].chat_history;
        assert_eq!(answer.chars().count(), MAX_CELL_CHARS);
        assert!(answer.ends_with(TRUNCATED_MARKER));
        assert!(matches!(fit_cell("short"), Cow::Borrowed("short")));
    }

    #[test]
    fn test_default_filenames() {
        let name = default_results_filename().display().to_string();
        assert!(name.starts_with("llm_evaluation_results_"));
        assert!(name.ends_with(".xlsx"));
        assert_eq!(name.len(), "llm_evaluation_results_20250101_120000.xlsx".len());
        assert!(default_answers_filename()
            .display()
            .to_string()
            .starts_with("rag_generated_answers_"));
    }
}
