//! Gradient HTTP Client
//!
//! Thin reqwest client for the parts of the Gradient REST API the tool uses:
//! embeddings, base model lookup and completion.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::{GradientCredentials, Settings};

const WORKSPACE_HEADER: &str = "x-gradient-workspace-id";

#[derive(Error, Debug)]
pub enum GradientError {
    #[error("Gradient request failed: {0}")]
    Request(String),
    #[error("Gradient request timed out")]
    Timeout,
    #[error("Gradient HTTP error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Base model not found: {0}")]
    ModelNotFound(String),
    #[error("Gradient returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

impl Serialize for GradientError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for GradientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GradientError::Timeout
        } else {
            GradientError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingInput<'a> {
    input: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    inputs: Vec<EmbeddingInput<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embeddings: Vec<EmbeddingItem>,
}

/// A base model offered by the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseModel {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaseModelsResponse {
    base_models: Vec<BaseModel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    query: &'a str,
    max_generated_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteResponse {
    generated_output: String,
}

/// Gradient HTTP client
#[derive(Clone)]
pub struct GradientClient {
    http: Client,
    base_url: String,
    credentials: GradientCredentials,
    timeout: Duration,
}

impl std::fmt::Debug for GradientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GradientClient {
    pub fn new(base_url: &str, credentials: GradientCredentials, timeout: Duration) -> Result<Self, GradientError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, GradientError> {
        Self::new(&settings.base_url, settings.credentials.clone(), settings.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.credentials.access_token)
            .header(WORKSPACE_HEADER, &self.credentials.workspace_id)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, GradientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!(call = %what, status = %status, body = %text, "Gradient HTTP error");
            return Err(GradientError::Http { status: status.as_u16(), body: text });
        }

        serde_json::from_str(&text).map_err(|e| GradientError::Deserialize(format!("{}: {}", what, e)))
    }

    /// Embed `texts` with the embeddings model `slug`, in input order.
    pub async fn embed(&self, slug: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, GradientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingsRequest {
            inputs: texts.iter().map(|t| EmbeddingInput { input: t }).collect(),
        };

        debug!(model = %slug, count = texts.len(), "Requesting embeddings");
        let resp: EmbeddingsResponse = self
            .send(self.request(Method::POST, &format!("/embeddings/{}", slug)).json(&body), "embeddings")
            .await?;

        order_embeddings(resp.embeddings, texts.len())
    }

    /// Base models available to the workspace
    pub async fn list_base_models(&self) -> Result<Vec<BaseModel>, GradientError> {
        let resp: BaseModelsResponse = self
            .send(
                self.request(Method::GET, "/models").query(&[("onlyBase", "true")]),
                "list models",
            )
            .await?;
        debug!(count = resp.base_models.len(), "Listed base models");
        Ok(resp.base_models)
    }

    /// Resolve a base model slug to its id.
    pub async fn resolve_base_model(&self, slug: &str) -> Result<String, GradientError> {
        let models = self.list_base_models().await?;
        find_model(&models, slug)
            .map(|m| m.id.clone())
            .ok_or_else(|| GradientError::ModelNotFound(slug.to_string()))
    }

    /// Complete `prompt` with the model `model_id`.
    pub async fn complete(&self, model_id: &str, prompt: &str, max_tokens: u32) -> Result<String, GradientError> {
        let body = CompleteRequest {
            query: prompt,
            max_generated_token_count: max_tokens,
        };

        debug!(model_id = %model_id, max_tokens = max_tokens, "Requesting completion");
        let resp: CompleteResponse = self
            .send(
                self.request(Method::POST, &format!("/models/{}/complete", model_id)).json(&body),
                "complete",
            )
            .await?;
        Ok(resp.generated_output)
    }
}

/// Put embeddings back in input order. Every input index must appear exactly once.
fn order_embeddings(mut items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>, GradientError> {
    if items.len() != expected {
        return Err(GradientError::CountMismatch { expected, got: items.len() });
    }

    items.sort_by_key(|item| item.index);
    if items.iter().enumerate().any(|(i, item)| item.index != i) {
        return Err(GradientError::Deserialize("embedding indices are not 0..n".to_string()));
    }

    Ok(items.into_iter().map(|item| item.embedding).collect())
}

fn find_model<'a>(models: &'a [BaseModel], slug: &str) -> Option<&'a BaseModel> {
    models.iter().find(|m| m.slug == slug)
}
