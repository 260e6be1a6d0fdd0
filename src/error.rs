//! Error types for the RAG evaluator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagEvalError>;

/// Errors that can occur while ingesting, retrieving, generating or judging.
#[derive(Error, Debug)]
pub enum RagEvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file error or missing setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The file extension is not one we can ingest.
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The remote service could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The remote service rejected our credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote service is throttling us.
    #[error("Rate limit exceeded. Please wait a moment and try again. ({0})")]
    RateLimit(String),

    /// Embedding provider error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector database error.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Spreadsheet read/write error.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Text extraction error.
    #[error("Document error: {0}")]
    Document(String),

    /// OCR pipeline error.
    #[error("OCR error: {0}")]
    Ocr(String),
}

impl RagEvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagEvalError::Connection(_) | RagEvalError::RateLimit(_) | RagEvalError::Http(_)
        )
    }
}

impl From<reqwest::Error> for RagEvalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RagEvalError::Connection(err.to_string())
        } else {
            RagEvalError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RagEvalError {
    fn from(err: serde_json::Error) -> Self {
        RagEvalError::LlmParse(err.to_string())
    }
}

impl From<calamine::Error> for RagEvalError {
    fn from(err: calamine::Error) -> Self {
        RagEvalError::Spreadsheet(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for RagEvalError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        RagEvalError::Spreadsheet(err.to_string())
    }
}

impl From<lopdf::Error> for RagEvalError {
    fn from(err: lopdf::Error) -> Self {
        RagEvalError::Document(format!("PDF: {}", err))
    }
}

impl From<zip::result::ZipError> for RagEvalError {
    fn from(err: zip::result::ZipError) -> Self {
        RagEvalError::Document(format!("DOCX archive: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RagEvalError::Connection("refused".into()).is_transient());
        assert!(RagEvalError::RateLimit("429".into()).is_transient());
        assert!(!RagEvalError::Authentication("bad key".into()).is_transient());
        assert!(!RagEvalError::Config("missing".into()).is_transient());
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = RagEvalError::io(
            "/tmp/missing.xlsx",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.xlsx"));
    }
}
