//! Text extraction from source documents.
//!
//! PDF, DOCX, TXT and Markdown files are turned into plain text. A PDF with
//! almost no extractable text can be handed to an [`OcrReader`] instead.

use crate::error::{RagEvalError, Result};
use crate::ocr::{OcrReader, is_scanned};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions accepted for ingestion.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

/// Plain text of one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// File name the text came from.
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// How a file's text is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
}

impl FileKind {
    /// Classify by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            "txt" | "md" => Ok(FileKind::Text),
            "" => Err(RagEvalError::UnsupportedFile(path.display().to_string())),
            other => Err(RagEvalError::UnsupportedFile(format!(".{}", other))),
        }
    }
}

/// Text of each PDF page, in page order. Pages whose text cannot be
/// extracted come back empty.
pub fn pdf_page_texts(bytes: &[u8]) -> Result<Vec<String>> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let pages = doc
        .get_pages()
        .into_keys()
        .map(|number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page = number, "no text extracted: {}", e);
                String::new()
            }
        })
        .collect();
    Ok(pages)
}

/// All PDF text, each page followed by a newline.
fn join_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page);
        text.push('\n');
    }
    text
}

/// Paragraph text of a DOCX file, each paragraph followed by a newline.
pub fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| RagEvalError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)
        .map_err(|e| RagEvalError::io(path, e))?;
    docx_text(&xml)
}

fn docx_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| RagEvalError::Document(format!("Invalid DOCX text: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RagEvalError::Document(format!(
                    "Error reading DOCX at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }
    Ok(text)
}

/// Extracts documents, optionally falling back to OCR for scanned PDFs.
#[derive(Default)]
pub struct DocumentLoader {
    ocr: Option<OcrReader>,
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// PDFs that look scanned are read with `ocr`.
    pub fn with_ocr(ocr: OcrReader) -> Self {
        Self { ocr: Some(ocr) }
    }

    pub fn uses_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Extract the text of one file.
    pub async fn load(&self, path: &Path) -> Result<Document> {
        let kind = FileKind::from_path(path)?;
        let text = match kind {
            FileKind::Pdf => self.load_pdf(path).await?,
            FileKind::Docx => extract_docx(path)?,
            FileKind::Text => std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?,
        };
        Ok(Document::new(source_name(path), text))
    }

    async fn load_pdf(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| RagEvalError::io(path, e))?;
        let pages = pdf_page_texts(&bytes)?;

        match &self.ocr {
            Some(ocr) if self.needs_ocr(&pages) => {
                tracing::info!(
                    file = %path.display(),
                    model = %ocr.describe(),
                    "Detected scanned PDF. Using OCR for text extraction"
                );
                ocr.read_pdf(path).await
            }
            _ => Ok(join_pages(&pages)),
        }
    }

    /// An OCR model is attached and the page texts look scanned.
    fn needs_ocr(&self, pages: &[String]) -> bool {
        self.ocr.is_some() && is_scanned(pages)
    }
}

/// File name used as the `source` of a document.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Expand directories into the supported files below them. Plain file
/// arguments are passed through unchanged so unsupported ones still get
/// reported.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| FileKind::from_path(p).is_ok())
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(RagEvalError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            ));
        }
    }
    Ok(files)
}
