use crate::embeddings::{ApiErrorResponse, OPENAI_API_BASE};
use crate::error::{RagError, Result};
use crate::models::ChatMessage;
use crate::traits::GenerationService;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(RagError::generation(model, "API key must not be empty"));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            model,
            temperature,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationService for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(model = %self.model, messages = messages.len(), "chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                temperature: self.temperature,
                messages,
            })
            .send()
            .await
            .map_err(|e| RagError::generation(&self.model, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(RagError::generation(
                &self.model,
                format!("API returned {status}: {detail}"),
            ));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| {
                RagError::generation(&self.model, format!("failed to parse response: {e}"))
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::generation(&self.model, "response contained no message"))
    }
}

/// Tries each provider in order and returns the first successful reply.
pub struct FallbackGenerator {
    providers: Vec<Arc<dyn GenerationService>>,
    label: String,
}

impl FallbackGenerator {
    pub fn new(providers: Vec<Arc<dyn GenerationService>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(RagError::Config(
                "at least one generation provider is required".to_string(),
            ));
        }
        let label = providers
            .iter()
            .map(|provider| provider.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        Ok(Self { providers, label })
    }

    /// Primary model plus the fallback model, unless both name the same model.
    pub fn from_models(
        api_key: &str,
        primary: &str,
        fallback: &str,
        temperature: f32,
    ) -> Result<Self> {
        let mut providers: Vec<Arc<dyn GenerationService>> =
            vec![Arc::new(OpenAiChatModel::new(api_key, primary, temperature)?)];
        info!(model = primary, temperature, "primary generation model");

        if !fallback.is_empty() && fallback != primary {
            providers.push(Arc::new(OpenAiChatModel::new(api_key, fallback, temperature)?));
            info!(model = fallback, "fallback generation model");
        }

        Self::new(providers)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl GenerationService for FallbackGenerator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut last_error = None;

        for provider in &self.providers {
            match provider.generate(messages).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(
                        provider = provider.name(),
                        error = %error,
                        "generation failed; trying next provider"
                    );
                    last_error = Some(error);
                }
            }
        }

        let message = last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no providers configured".to_string());
        Err(RagError::generation(
            &self.label,
            format!("all providers failed; last error: {message}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("be brief"), ChatMessage::user("hello?")]
    }

    #[tokio::test]
    async fn primary_answer_skips_fallback() {
        let primary = Arc::new(ScriptedGenerator::answering("primary", "from primary"));
        let fallback = Arc::new(ScriptedGenerator::answering("fallback", "from fallback"));
        let providers: Vec<Arc<dyn GenerationService>> = vec![primary.clone(), fallback.clone()];
        let generator = FallbackGenerator::new(providers).unwrap();

        assert_eq!(generator.generate(&messages()).await.unwrap(), "from primary");
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn failing_primary_falls_back() {
        let primary = Arc::new(ScriptedGenerator::failing("primary", "rate limited"));
        let fallback = Arc::new(ScriptedGenerator::answering("fallback", "from fallback"));
        let providers: Vec<Arc<dyn GenerationService>> = vec![primary.clone(), fallback.clone()];
        let generator = FallbackGenerator::new(providers).unwrap();

        assert_eq!(generator.generate(&messages()).await.unwrap(), "from fallback");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn both_failing_is_a_generation_error() {
        let providers: Vec<Arc<dyn GenerationService>> = vec![
            Arc::new(ScriptedGenerator::failing("primary", "down")),
            Arc::new(ScriptedGenerator::failing("fallback", "also down")),
        ];
        let generator = FallbackGenerator::new(providers).unwrap();

        let error = generator.generate(&messages()).await.unwrap_err();
        assert!(matches!(error, RagError::Generation { .. }));
        assert!(error.to_string().contains("also down"));
    }

    #[test]
    fn identical_fallback_model_is_not_added_twice() {
        let generator = FallbackGenerator::from_models("sk-test", "gpt-4o", "gpt-4o", 0.0).unwrap();
        assert_eq!(generator.len(), 1);

        let generator =
            FallbackGenerator::from_models("sk-test", "gpt-4o", "gpt-4o-mini", 0.0).unwrap();
        assert_eq!(generator.len(), 2);
        assert_eq!(generator.name(), "gpt-4o -> gpt-4o-mini");
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        assert!(FallbackGenerator::new(Vec::new()).is_err());
    }
}
