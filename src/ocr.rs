//! Text extraction from scanned PDFs with a vision model.
//!
//! Pages are rendered to PNG with poppler's `pdftoppm`, then each image is
//! sent to an OpenAI-compatible vision model together with
//! [`Prompts::ocr_extract`].

use crate::config::OcrConfig;
use crate::error::{RagEvalError, Result};
use crate::llm::{ChatModel, LlmClient, Message, Prompts};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Average extractable characters per page below which a PDF counts as scanned.
const SCANNED_CHARS_PER_PAGE: usize = 50;

/// Pages sampled by [`is_scanned`].
const SAMPLE_PAGES: usize = 3;

const POPPLER_HINT: &str = "Poppler is not installed or not accessible. Please install Poppler:\n\
  - Docker: Poppler is installed in the Docker image\n\
  - Linux: sudo apt-get install poppler-utils\n\
  - macOS: brew install poppler\n\
  - Windows: download from https://github.com/oschwartz10612/poppler-windows/releases\n\
Then ensure pdftoppm is on your PATH.";

/// Whether extracted page texts look like a scan: fewer than 50 characters
/// per page on average over the first three pages. No pages counts as a scan.
pub fn is_scanned(pages: &[String]) -> bool {
    let sampled = pages.len().min(SAMPLE_PAGES);
    if sampled == 0 {
        return true;
    }
    let total: usize = pages[..sampled]
        .iter()
        .map(|p| p.trim().chars().count())
        .sum();
    total / sampled < SCANNED_CHARS_PER_PAGE
}

/// Reads scanned documents through a vision model.
pub struct OcrReader {
    model: Box<dyn ChatModel>,
}

impl OcrReader {
    pub fn new(model: Box<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(RagEvalError::Config(
                "No OCR model selected. Choose one with `rag-eval models set ocr`.".to_string(),
            ));
        }
        Ok(Self::new(Box::new(LlmClient::new(config.to_llm_config())?)))
    }

    pub fn describe(&self) -> String {
        self.model.describe()
    }

    /// Extract the text of every page, pages separated by a blank line.
    pub async fn read_pdf(&self, path: &Path) -> Result<String> {
        let workdir = tempfile::tempdir()
            .map_err(|e| RagEvalError::Ocr(format!("Failed to create temp dir: {}", e)))?;
        let images = render_pages(path, workdir.path()).await?;
        if images.is_empty() {
            return Err(RagEvalError::Ocr(format!(
                "No pages rendered from {}",
                path.display()
            )));
        }

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let png = tokio::fs::read(image)
                .await
                .map_err(|e| RagEvalError::io(image, e))?;
            let text = self.read_png(&png).await?;
            tracing::debug!(page = i + 1, total = images.len(), "OCR page done");
            pages.push(text);
        }
        Ok(pages.join("\n\n"))
    }

    /// Extract the text of one PNG image.
    pub async fn read_png(&self, png: &[u8]) -> Result<String> {
        let encoded = STANDARD.encode(png);
        let response = self
            .model
            .chat(vec![Message::user_with_png(Prompts::ocr_extract(), &encoded)])
            .await?;
        Ok(response.content)
    }
}

/// Render each page of `pdf` into `dir` as `page-N.png`, in page order.
pub async fn render_pages(pdf: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let prefix = dir.join("page");
    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg(pdf)
        .arg(&prefix)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RagEvalError::Ocr(POPPLER_HINT.to_string())
            } else {
                RagEvalError::Ocr(format!("Failed to run pdftoppm: {}", e))
            }
        })?;

    if !output.status.success() {
        return Err(RagEvalError::Ocr(format!(
            "Failed to convert PDF to images: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut pages: Vec<(usize, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| RagEvalError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| page_number(&path).map(|n| (n, path)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// `page-07.png` -> 7. pdftoppm zero-pads to the width of the page count.
fn page_number(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix("page-")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct EchoVision {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChatModel for EchoVision {
        async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
            let json = serde_json::to_string(&messages[0]).unwrap();
            self.seen.lock().unwrap().push(json);
            Ok(LlmResponse {
                content: "page text".to_string(),
                finish_reason: None,
                usage: None,
            })
        }

        fn describe(&self) -> String {
            "Custom Models - vision".to_string()
        }
    }

    #[test]
    fn test_scanned_heuristic() {
        let empty = vec![String::new(), "  ".to_string()];
        assert!(is_scanned(&empty));

        let text = vec!["x".repeat(200), String::new(), String::new(), "y".repeat(10)];
        // (200 + 0 + 0) / 3 = 66, fourth page is not sampled.
        assert!(!is_scanned(&text));

        let sparse = vec!["x".repeat(120), String::new(), String::new()];
        assert!(is_scanned(&sparse));
        assert!(is_scanned(&[]));
    }

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/page-1.ppm")), None);
        assert_eq!(page_number(Path::new("/tmp/x/other-1.png")), None);
    }

    #[tokio::test]
    async fn test_png_is_sent_as_data_url() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = OcrReader::new(Box::new(EchoVision { seen: seen.clone() }));
        let text = reader.read_png(&[1, 2, 3]).await.unwrap();
        assert_eq!(text, "page text");

        let sent = seen.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("data:image/png;base64,AQID"));
        assert!(sent[0].contains("Please extract all text from this image."));
    }

    #[test]
    fn test_unconfigured_ocr_is_rejected() {
        assert!(OcrReader::from_config(&OcrConfig::default()).is_err());
    }
}
