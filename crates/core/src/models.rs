use serde::{Deserialize, Serialize};

/// One page of one input file. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    pub source_path: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub page_number: u32,
    pub chunk_index: u32,
}

/// A chunk as stored in the index. Metadata is optional so records written by
/// other tools still load; the citation formatter fills in placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub text: String,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub chunk_index: Option<u32>,
}

impl IndexedRecord {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            vector,
            text: chunk.text,
            source_path: Some(chunk.source_path),
            page_number: Some(chunk.page_number),
            chunk_index: Some(chunk.chunk_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRecord {
    pub rank: usize,
    pub score: f32,
    pub record: IndexedRecord,
}

pub type RetrievedResult = Vec<RetrievedRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
