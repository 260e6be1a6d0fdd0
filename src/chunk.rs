//! Recursive character text splitting.
//!
//! Text is split on the first separator that occurs in it (paragraphs, then
//! lines, then words, then characters). Pieces that are still too long are
//! split again with the remaining separators, and small pieces are merged
//! back together up to `chunk_size` characters with `chunk_overlap`
//! characters carried over between neighbours.

use crate::document::Document;
use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Configuration for text chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 50,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagEvalError::Config("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagEvalError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// A chunk of text with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content.
    pub text: String,
    /// File the chunk came from.
    pub source: String,
    /// Position of the chunk within its document.
    pub index: usize,
}

/// Splits documents into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split every document, tagging chunks with the document's source.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| Chunk {
                        text,
                        source: doc.source.clone(),
                        index,
                    })
            })
            .collect()
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small: Vec<String> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(&piece) < self.config.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                if let Some(trimmed) = trimmed_non_empty(&piece) {
                    chunks.push(trimmed);
                }
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, keeping up to `chunk_overlap`
    /// trailing characters of one chunk at the start of the next.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut out = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > size && !current.is_empty() {
                if total > size {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        size
                    );
                }
                if let Some(chunk) = join(&current) {
                    out.push(chunk);
                }
                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join(&current) {
            out.push(chunk);
        }
        out
    }
}

/// Split on `separator`, keeping each separator at the start of the piece
/// that follows it. Empty pieces are dropped. An empty separator splits into
/// characters.
fn split_keep_start(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces
}

fn join(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    trimmed_non_empty(&joined)
}

fn trimmed_non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
