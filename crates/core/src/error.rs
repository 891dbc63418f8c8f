use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("no source documents in {0} and no persisted index; add documents before building the index")]
    NoSourceData(String),

    #[error("no persisted index named {name} in {dir}")]
    IndexNotFound { dir: String, name: String },

    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    #[error("generation error ({provider}): {message}")]
    Generation { provider: String, message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("persisted index is corrupt: {0}")]
    CorruptIndex(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("chart rendering failed: {0}")]
    Render(String),
}

impl RagError {
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for chunk parameter problems, which surface through [`IngestError`].
    pub fn is_chunking_error(&self) -> bool {
        matches!(self, Self::Ingest(IngestError::InvalidChunkConfig(_)))
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
