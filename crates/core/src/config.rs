use crate::chunking::ChunkingConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_INDEX_NAME: &str = "paper_index";
pub const LOCAL_EMBEDDING_PREFIX: &str = "local-ngram";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub embedding_model: String,
    pub generation_model: String,
    pub generation_fallback_model: String,
    pub temperature: f32,
    pub document_dir: PathBuf,
    pub index_dir: PathBuf,
    pub index_name: String,
    pub artifacts_dir: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            retrieval_k: 4,
            embedding_model: "text-embedding-3-large".to_string(),
            generation_model: "gpt-4o".to_string(),
            generation_fallback_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            document_dir: PathBuf::from("data/papers"),
            index_dir: PathBuf::from("data/index"),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(RagError::Config("retrieval_k must be greater than zero".to_string()));
        }
        if self.index_name.trim().is_empty() {
            return Err(RagError::Config("index_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn chunking(&self) -> Result<ChunkingConfig> {
        Ok(ChunkingConfig::new(self.chunk_size, self.chunk_overlap)?)
    }

    pub fn uses_local_embeddings(&self) -> bool {
        self.embedding_model.starts_with(LOCAL_EMBEDDING_PREFIX)
    }

    /// Fingerprint of every setting that changes what ends up in the index.
    /// `model_name` is the resolved embedder name, so aliases of one model
    /// share a stamp.
    pub fn index_stamp(&self, model_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_name.as_bytes());
        hasher.update(b"\0");
        hasher.update((self.chunk_size as u64).to_le_bytes());
        hasher.update((self.chunk_overlap as u64).to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.document_dir, &self.index_dir, &self.artifacts_dir] {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    debug!(dir = %dir.display(), "directory ready");
    Ok(())
}

/// Loads `.env` from the working directory into the process environment.
/// Variables already set win over the file.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

pub fn load_api_key() -> Result<String> {
    load_env_file();
    std::env::var(API_KEY_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            RagError::Config(format!(
                "{API_KEY_VAR} is not set; export it or add it to a .env file"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..RagConfig::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
        assert!(config.chunking().is_err_and(|error| error.is_chunking_error()));
    }

    #[test]
    fn zero_retrieval_k_is_rejected() {
        let config = RagConfig {
            retrieval_k: 0,
            ..RagConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stamp_tracks_index_shaping_settings_only() {
        let base = RagConfig::default();
        let other_model = RagConfig {
            generation_model: "another-chat-model".to_string(),
            retrieval_k: 9,
            ..RagConfig::default()
        };
        let other_chunks = RagConfig {
            chunk_size: 500,
            ..RagConfig::default()
        };

        assert_eq!(base.index_stamp("model"), other_model.index_stamp("model"));
        assert_ne!(base.index_stamp("model"), other_chunks.index_stamp("model"));
        assert_ne!(base.index_stamp("model"), base.index_stamp("other-model"));
    }

    #[test]
    fn ensure_directories_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = RagConfig {
            document_dir: dir.path().join("data/papers"),
            index_dir: dir.path().join("data/index"),
            artifacts_dir: dir.path().join("artifacts"),
            ..RagConfig::default()
        };

        config.ensure_directories()?;
        config.ensure_directories()?;

        assert!(config.document_dir.is_dir());
        assert!(config.index_dir.is_dir());
        assert!(config.artifacts_dir.is_dir());
        Ok(())
    }
}
