//! Gradient-backed embedding and language models.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use super::client::{GradientClient, GradientError};
use crate::documents::embeddings::{Embedding, EmbeddingError, EmbeddingModel};
use crate::documents::query::{GenerationError, LanguageModel};

/// Hosted embeddings model, addressed by slug
#[derive(Debug, Clone)]
pub struct GradientEmbedding {
    client: Arc<GradientClient>,
    slug: String,
}

impl GradientEmbedding {
    pub fn new(client: Arc<GradientClient>, slug: impl Into<String>) -> Self {
        Self { client, slug: slug.into() }
    }
}

#[async_trait]
impl EmbeddingModel for GradientEmbedding {
    fn name(&self) -> &str {
        &self.slug
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.client.embed(&self.slug, texts).await.map_err(|e| match e {
            GradientError::Timeout => EmbeddingError::Timeout(self.client.timeout().as_secs()),
            GradientError::Request(msg) => EmbeddingError::Unavailable(msg),
            GradientError::CountMismatch { expected, got } => EmbeddingError::CountMismatch { expected, got },
            other => EmbeddingError::GenerationFailed(other.to_string()),
        })
    }
}

/// Hosted base model. The slug is resolved to a model id on first use.
#[derive(Debug)]
pub struct GradientLlm {
    client: Arc<GradientClient>,
    slug: String,
    model_id: OnceCell<String>,
}

impl GradientLlm {
    pub fn new(client: Arc<GradientClient>, slug: impl Into<String>) -> Self {
        Self {
            client,
            slug: slug.into(),
            model_id: OnceCell::new(),
        }
    }

    async fn model_id(&self) -> Result<&str, GradientError> {
        let id = self
            .model_id
            .get_or_try_init(|| async {
                let id = self.client.resolve_base_model(&self.slug).await?;
                info!(slug = %self.slug, model_id = %id, "Resolved base model");
                Ok::<_, GradientError>(id)
            })
            .await?;
        Ok(id.as_str())
    }
}

impl From<GradientError> for GenerationError {
    fn from(e: GradientError) -> Self {
        match e {
            GradientError::Request(msg) => GenerationError::Unavailable(msg),
            GradientError::Timeout => GenerationError::Unavailable("request timed out".to_string()),
            other => GenerationError::Failed(other.to_string()),
        }
    }
}

#[async_trait]
impl LanguageModel for GradientLlm {
    fn name(&self) -> &str {
        &self.slug
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let model_id = self.model_id().await?;
        Ok(self.client.complete(model_id, prompt, max_tokens).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_errors_map_to_generation_errors() {
        assert!(matches!(
            GenerationError::from(GradientError::Request("refused".to_string())),
            GenerationError::Unavailable(_)
        ));
        assert!(matches!(
            GenerationError::from(GradientError::ModelNotFound("x".to_string())),
            GenerationError::Failed(_)
        ));
        assert!(matches!(
            GenerationError::from(GradientError::Http { status: 500, body: String::new() }),
            GenerationError::Failed(ref msg) if msg.contains("500")
        ));
    }
}
