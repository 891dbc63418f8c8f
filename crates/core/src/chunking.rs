use crate::error::IngestError;
use crate::models::{Chunk, SourceDocument};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap ({overlap_chars}) must be less than chunk_size ({max_chars})"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    fn step(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits one text into windows of at most `max_chars` characters, each
/// starting `max_chars - overlap_chars` characters after the previous one.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += config.step();
    }

    pieces
}

pub fn split_documents(documents: &[SourceDocument], config: ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|document| {
            split_text(&document.text, config)
                .into_iter()
                .enumerate()
                .map(|(index, text)| Chunk {
                    text,
                    source_path: document.source_path.clone(),
                    page_number: document.page_number,
                    chunk_index: index as u32,
                })
        })
        .collect();

    info!(
        pages = documents.len(),
        chunk_count = chunks.len(),
        chunk_size = config.max_chars,
        chunk_overlap = config.overlap_chars,
        "split pages into chunks"
    );
    chunks
}
