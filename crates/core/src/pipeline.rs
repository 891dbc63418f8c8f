use crate::citation::format_citations;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{ChatMessage, RetrievedResult};
use crate::traits::{EmbeddingService, GenerationService};
use std::sync::Arc;
use tracing::info;

pub const RAG_SYSTEM_PROMPT: &str = "You are a research assistant. Use the following retrieved context \
to answer the question. Always cite sources using the bracketed \
numbers provided. If the context does not contain the answer, \
say so clearly.\n\n\
Context:\n{context}\n";

pub fn system_prompt(context: &str) -> String {
    RAG_SYSTEM_PROMPT.replace("{context}", context)
}

pub fn build_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(context)),
        ChatMessage::user(question),
    ]
}

/// Retrieval, citation formatting and one generation request per question.
pub struct AnswerPipeline<'a> {
    index: &'a VectorIndex,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    k: usize,
}

impl<'a> AnswerPipeline<'a> {
    pub fn new(
        index: &'a VectorIndex,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
        k: usize,
    ) -> Result<Self> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be at least 1".to_string()));
        }
        Ok(Self {
            index,
            embedder,
            generator,
            k,
        })
    }

    pub async fn retrieve(&self, question: &str) -> Result<RetrievedResult> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("question is empty".to_string()));
        }
        let query_vector = self.embedder.embed(question).await?;
        self.index.query(&query_vector, self.k)
    }

    pub async fn answer(&self, question: &str) -> Result<String> {
        Ok(self.answer_with_sources(question).await?.0)
    }

    /// Like [`answer`](Self::answer), also handing back the records the
    /// citation numbers refer to.
    pub async fn answer_with_sources(&self, question: &str) -> Result<(String, RetrievedResult)> {
        let retrieved = self.retrieve(question).await?;
        let context = format_citations(&retrieved);
        let messages = build_messages(&context, question);

        let answer = self.generator.generate(&messages).await?;
        info!(
            retrieved = retrieved.len(),
            generator = self.generator.name(),
            "answered question"
        );
        Ok((answer, retrieved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{chunk, FailingEmbedder, FixedEmbedder, ScriptedGenerator};

    fn embedder() -> Arc<FixedEmbedder> {
        Arc::new(FixedEmbedder::new(&[
            ("Alpha", vec![1.0, 0.0]),
            ("Beta", vec![0.9, 0.1]),
            ("Gamma", vec![0.0, 1.0]),
            ("what is alpha?", vec![1.0, 0.0]),
        ]))
    }

    async fn index() -> VectorIndex {
        let chunks = vec![
            chunk("Gamma", "c.pdf", 9),
            chunk("Alpha", "a.pdf", 3),
            chunk("Beta", "b.pdf", 5),
        ];
        VectorIndex::build(chunks, embedder().as_ref(), "stamp").await.unwrap()
    }

    #[tokio::test]
    async fn request_has_fixed_shape_and_answer_is_returned_verbatim() {
        let index = index().await;
        let generator = Arc::new(ScriptedGenerator::answering("model", "  Alpha [1].\n"));
        let pipeline = AnswerPipeline::new(&index, embedder(), generator.clone(), 2).unwrap();

        let answer = pipeline.answer("what is alpha?").await.unwrap();
        assert_eq!(answer, "  Alpha [1].\n");

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let messages = &seen[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "what is alpha?");
        assert!(messages[0].content.contains("bracketed numbers"));
        assert!(messages[0].content.contains("does not contain the answer"));
        assert!(messages[0].content.ends_with(
            "Context:\n[1] (Source: a.pdf, p.3)\nAlpha\n\n[2] (Source: b.pdf, p.5)\nBeta\n"
        ));
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback_answer() {
        let index = index().await;
        let providers: Vec<Arc<dyn GenerationService>> = vec![
            Arc::new(ScriptedGenerator::failing("primary", "boom")),
            Arc::new(ScriptedGenerator::answering("fallback", "fallback says hi")),
        ];
        let generator = Arc::new(crate::FallbackGenerator::new(providers).unwrap());
        let pipeline = AnswerPipeline::new(&index, embedder(), generator, 1).unwrap();

        assert_eq!(pipeline.answer("what is alpha?").await.unwrap(), "fallback says hi");
    }

    #[tokio::test]
    async fn collaborator_failures_propagate() {
        let index = index().await;
        let generator = Arc::new(ScriptedGenerator::failing("model", "down"));
        let pipeline = AnswerPipeline::new(&index, embedder(), generator, 1).unwrap();
        assert!(matches!(
            pipeline.answer("what is alpha?").await,
            Err(RagError::Generation { .. })
        ));

        let generator = Arc::new(ScriptedGenerator::answering("model", "unused"));
        let pipeline = AnswerPipeline::new(&index, Arc::new(FailingEmbedder), generator, 1).unwrap();
        assert!(matches!(
            pipeline.answer("what is alpha?").await,
            Err(RagError::Embedding { .. })
        ));
    }

    #[tokio::test]
    async fn blank_question_and_zero_k_are_rejected() {
        let index = index().await;
        let generator = Arc::new(ScriptedGenerator::answering("model", "unused"));
        assert!(AnswerPipeline::new(&index, embedder(), generator.clone(), 0).is_err());

        let pipeline = AnswerPipeline::new(&index, embedder(), generator.clone(), 1).unwrap();
        assert!(matches!(
            pipeline.answer("   ").await,
            Err(RagError::InvalidArgument(_))
        ));
        assert_eq!(generator.call_count(), 0);
    }
}
