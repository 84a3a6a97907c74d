//! Query Engine
//!
//! Answers questions over one `DocumentIndex`: embed the question, retrieve
//! the closest chunks, fit them into a prompt and ask the language model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::embeddings::{EmbeddingError, EmbeddingModel};
use super::index::{DocumentIndex, IndexError, IndexedDocument, SearchResult};
use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT_SECS, DEFAULT_TOP_K};
use crate::context::{build_prompt, PromptBudget, DEFAULT_CONTEXT_WINDOW};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Language model unavailable: {0}")]
    Unavailable(String),
    #[error("Generation failed: {0}")]
    Failed(String),
}

impl Serialize for GenerationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Produces text for a prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Name shown in logs
    fn name(&self) -> &str;

    /// Complete `prompt`, generating at most `max_tokens` tokens.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Question is empty")]
    EmptyQuestion,
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("Language model returned an empty answer")]
    EmptyAnswer,
}

impl Serialize for QueryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Retrieval and generation knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub max_tokens: u32,
    pub context_window: u32,
    pub timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_MAX_TOKENS,
            context_window: DEFAULT_CONTEXT_WINDOW,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// A generated answer and the chunks it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchResult>,
}

/// Question answering over one indexed document
#[derive(Clone)]
pub struct QueryEngine {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    llm: Arc<dyn LanguageModel>,
    options: QueryOptions,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("document", &self.index.document().filename)
            .field("chunks", &self.index.len())
            .field("embedder", &self.embedder.name())
            .field("llm", &self.llm.name())
            .field("options", &self.options)
            .finish()
    }
}

impl QueryEngine {
    pub fn new(
        index: DocumentIndex,
        embedder: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn LanguageModel>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index: Arc::new(index),
            embedder,
            llm,
            options,
        }
    }

    pub fn document(&self) -> &IndexedDocument {
        self.index.document()
    }

    /// Answer `question` from the indexed document.
    ///
    /// Returns non-empty text or an error; never an empty answer.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let started = Instant::now();
        let timeout_secs = self.options.timeout.as_secs();

        let query_vector = tokio::time::timeout(self.options.timeout, self.embedder.embed_query(question))
            .await
            .map_err(|_| QueryError::Timeout(timeout_secs))??;

        let sources = self.index.query_index(&query_vector, self.options.top_k)?;
        debug!(
            retrieved = sources.len(),
            best_score = sources.first().map(|s| s.score).unwrap_or(0.0),
            "Retrieved context"
        );

        let budget = PromptBudget::new(self.options.context_window, self.options.max_tokens);
        let prompt = build_prompt(&sources, question, &budget);

        let generated = tokio::time::timeout(
            self.options.timeout,
            self.llm.generate(&prompt, self.options.max_tokens),
        )
        .await
        .map_err(|_| QueryError::Timeout(timeout_secs))??;

        let text = generated.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyAnswer);
        }

        info!(
            document = %self.index.document().filename,
            sources = sources.len(),
            answer_chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered question"
        );

        Ok(Answer {
            text: text.to_string(),
            sources,
        })
    }
}
