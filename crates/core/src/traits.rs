use crate::error::Result;
use crate::models::ChatMessage;
use crate::table::Table;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait]
pub trait TabularAgentService: Send + Sync {
    async fn ask(&self, table: &Table, question: &str) -> Result<String>;
}
