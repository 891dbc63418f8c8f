pub mod artifacts;
pub mod chunking;
pub mod citation;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod table;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use artifacts::ArtifactStore;
pub use chunking::{normalize_whitespace, split_documents, split_text, ChunkingConfig};
pub use citation::{cited_numbers, format_citations};
pub use config::{load_api_key, load_env_file, RagConfig, DEFAULT_INDEX_NAME};
pub use embeddings::{
    CharacterNgramEmbedder, OpenAiEmbeddings, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, RagError, Result};
pub use extractor::{extract_page_texts, PageExtractor, PageText};
pub use generation::{FallbackGenerator, OpenAiChatModel};
pub use index::{persisted_index_exists, VectorIndex};
pub use ingest::{discover_documents, load_documents};
pub use lifecycle::{IndexLifecycle, IndexOrigin, IndexState};
pub use models::{
    ChatMessage, Chunk, IndexedRecord, RetrievedRecord, RetrievedResult, Role, SourceDocument,
};
pub use pipeline::{AnswerPipeline, RAG_SYSTEM_PROMPT};
pub use table::{LlmTableAgent, Table};
pub use traits::{EmbeddingService, GenerationService, TabularAgentService};
