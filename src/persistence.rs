//! Persistence layer for session state and evaluation results.
//!
//! Supports both JSON (human-readable) and bincode (compact binary) formats,
//! chosen by file extension.

use crate::error::{RagEvalError, Result};
use crate::eval::EvaluationResult;
use crate::session::Session;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Default filename for the session state.
pub const DEFAULT_SESSION_FILENAME: &str = "session.json";

/// Default filename for the latest evaluation results.
pub const DEFAULT_RESULTS_FILENAME: &str = "evaluation_results.json";

/// Save format for persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Directory holding session and results files.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rag-evaluator").map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn default_session_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_SESSION_FILENAME)
}

pub fn default_results_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_RESULTS_FILENAME)
}

/// Write `value` to `path`, creating parent directories.
pub fn save<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagEvalError::io(parent, e))?;
        }
    }

    let data = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| RagEvalError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => {
            bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map_err(|e| RagEvalError::Serialization(e.to_string()))?
        }
    };

    fs::write(path, &data).map_err(|e| RagEvalError::io(path, e))
}

/// Read a value written by [`save`].
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|e| RagEvalError::io(path, e))?;

    match SaveFormat::from_path(path) {
        SaveFormat::Json => {
            serde_json::from_slice(&data).map_err(|e| RagEvalError::Serialization(e.to_string()))
        }
        SaveFormat::Bincode => {
            let (value, _): (T, usize) =
                bincode::serde::decode_from_slice(&data, bincode::config::standard())
                    .map_err(|e| RagEvalError::Serialization(e.to_string()))?;
            Ok(value)
        }
    }
}

/// Load the session at `path`, or a fresh one if none was saved yet.
pub fn load_session(path: &Path) -> Result<Session> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no session file, starting fresh");
        return Ok(Session::default());
    }
    load(path)
}

pub fn save_session(session: &Session, path: &Path) -> Result<()> {
    save(session, path)
}

pub fn save_results(results: &[EvaluationResult], path: &Path) -> Result<()> {
    save(&results, path)
}

/// Load saved results; a missing file means there are none yet.
pub fn load_results(path: &Path) -> Result<Vec<EvaluationResult>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Evaluation, MetricScore, add_custom_metric};
    use crate::session::{CustomModel, ModelRole};
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_session() -> Session {
        let mut session = Session::default();
        add_custom_metric(&mut session.custom_metrics, "Tone Check", "Is it polite?").unwrap();
        session.selected_models.set(
            ModelRole::Inference,
            CustomModel::new(
                "meta-llama/Llama-3.3-70B-Instruct",
                "key",
                "DeepInfra",
                &crate::config::Config::default(),
            )
            .unwrap(),
        );
        session
            .collection_files
            .insert("docs".to_string(), vec!["a.pdf".to_string()]);
        session
    }

    fn create_test_result() -> EvaluationResult {
        EvaluationResult {
            question: "What is the refund policy?".to_string(),
            ground_truth: "30 days".to_string(),
            chat_history: String::new(),
            response: "Thirty days.".to_string(),
            retrieved_chunks: vec!["Refunds within 30 days.".to_string()],
            evaluation: Evaluation {
                overall_score: 8.5,
                metrics: vec![MetricScore {
                    id: "correctness".to_string(),
                    score: 9.0,
                    explanation: "Matches".to_string(),
                }],
                summary: "Good".to_string(),
                recommendations: String::new(),
            },
            model: "OpenAI - gpt-4o".to_string(),
            collection: "docs".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_session_json_and_bincode() {
        let dir = TempDir::new().unwrap();
        let original = create_test_session();

        for name in ["nested/session.json", "session.bin"] {
            let path = dir.path().join(name);
            save_session(&original, &path).unwrap();
            assert_eq!(load_session(&path).unwrap(), original);
        }
    }

    #[test]
    fn test_missing_session_is_default() {
        let dir = TempDir::new().unwrap();
        let session = load_session(&dir.path().join("none.json")).unwrap();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_results_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        assert!(load_results(&path).unwrap().is_empty());

        let results = vec![create_test_result()];
        save_results(&results, &path).unwrap();
        assert_eq!(load_results(&path).unwrap(), results);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"overall_score\": 8.5"));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("s.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("s.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("s.bincode")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("s")), SaveFormat::Json);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_session(&path),
            Err(RagEvalError::Serialization(_))
        ));
    }
}
