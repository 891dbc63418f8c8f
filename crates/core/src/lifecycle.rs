use crate::chunking::split_documents;
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::index::{persisted_index_exists, VectorIndex};
use crate::ingest::load_documents;
use crate::models::SourceDocument;
use crate::traits::EmbeddingService;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    NoIndex,
    Ready,
}

/// How the held index came to be; useful for callers reporting progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built,
}

/// Owns the load-or-build decision for one configured index location.
pub struct IndexLifecycle {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingService>,
    index: Option<(VectorIndex, IndexOrigin)>,
}

impl IndexLifecycle {
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingService>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            index: None,
        })
    }

    pub fn state(&self) -> IndexState {
        if self.index.is_some() {
            IndexState::Ready
        } else {
            IndexState::NoIndex
        }
    }

    pub fn origin(&self) -> Option<IndexOrigin> {
        self.index.as_ref().map(|(_, origin)| *origin)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub async fn get_or_build(&mut self) -> Result<&VectorIndex> {
        if self.index.is_none() {
            let ready = self.resolve().await?;
            self.index = Some(ready);
        }
        self.ready_index()
    }

    /// Rebuilds from the document directory even when a persisted index exists.
    pub async fn rebuild(&mut self) -> Result<&VectorIndex> {
        self.index = None;
        let documents = self.source_documents()?;
        let built = self.build_and_persist(documents).await?;
        self.index = Some((built, IndexOrigin::Built));
        self.ready_index()
    }

    pub fn into_index(self) -> Option<VectorIndex> {
        self.index.map(|(index, _)| index)
    }

    fn ready_index(&self) -> Result<&VectorIndex> {
        self.index
            .as_ref()
            .map(|(index, _)| index)
            .ok_or_else(|| RagError::InvalidArgument("index is not ready".to_string()))
    }

    async fn resolve(&self) -> Result<(VectorIndex, IndexOrigin)> {
        let dir = &self.config.index_dir;
        let name = &self.config.index_name;

        if persisted_index_exists(dir, name) {
            info!(dir = %dir.display(), name, "found persisted index");
            let loaded = VectorIndex::load(dir, name)?;
            let expected = self.stamp();
            if loaded.stamp() == expected {
                return Ok((loaded, IndexOrigin::Loaded));
            }

            let documents = load_documents(&self.config.document_dir)?;
            if documents.is_empty() {
                warn!(name, "stale persisted index and no documents to rebuild it; using it as is");
                return Ok((loaded, IndexOrigin::Loaded));
            }

            warn!(name, "persisted index was built with different settings; rebuilding");
            let built = self.build_and_persist(documents).await?;
            return Ok((built, IndexOrigin::Built));
        }

        info!(dir = %dir.display(), name, "no persisted index; building from documents");
        let documents = self.source_documents()?;
        let built = self.build_and_persist(documents).await?;
        Ok((built, IndexOrigin::Built))
    }

    fn stamp(&self) -> String {
        self.config.index_stamp(self.embedder.model_name())
    }

    fn source_documents(&self) -> Result<Vec<SourceDocument>> {
        let documents = load_documents(&self.config.document_dir)?;
        if documents.is_empty() {
            return Err(RagError::NoSourceData(
                self.config.document_dir.display().to_string(),
            ));
        }
        Ok(documents)
    }

    async fn build_and_persist(&self, documents: Vec<SourceDocument>) -> Result<VectorIndex> {
        let chunks = split_documents(&documents, self.config.chunking()?);
        let index = VectorIndex::build(chunks, self.embedder.as_ref(), self.stamp()).await?;
        index.persist(&self.config.index_dir, &self.config.index_name)?;
        Ok(index)
    }
}
