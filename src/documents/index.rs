//! Document Index
//!
//! Builds the in-memory vector index for one document and answers
//! nearest-neighbour queries against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::chunker::{chunk_document, Chunk, ChunkerError, SplitterConfig};
use super::embeddings::{find_similar, Embedding, EmbeddingError, EmbeddingModel};
use super::loader::{DocumentLoader, LoadedDocument, LoaderError, PdfLoader};
use crate::config::{DEFAULT_EMBED_BATCH_SIZE, DEFAULT_TIMEOUT_SECS};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Load error: {0}")]
    Load(#[from] LoaderError),
    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Document produced no text segments: {0}")]
    EmptyDocument(String),
    #[error("Embedding request timed out after {0}s")]
    Timeout(u64),
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl Serialize for IndexError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Summary of an indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub id: String,
    pub filename: String,
    pub total_tokens: u32,
    pub chunk_count: u32,
    pub dimension: usize,
    pub indexed_at: DateTime<Utc>,
}

/// Search result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_index: u32,
    pub content: String,
    pub score: f32,
    pub token_count: u32,
}

/// Chunks of one document with their embeddings
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    document: IndexedDocument,
    chunks: Vec<Chunk>,
    embeddings: Vec<Embedding>,
}

impl DocumentIndex {
    /// Assemble an index. Every chunk needs exactly one embedding and all
    /// embeddings must share a dimension.
    pub fn new(
        id: String,
        filename: String,
        total_tokens: u32,
        chunks: Vec<Chunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
            }.into());
        }
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument(filename));
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch { expected: 1, got: 0 });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(IndexError::DimensionMismatch { expected: dimension, got: bad.len() });
        }

        let document = IndexedDocument {
            id,
            filename,
            total_tokens,
            chunk_count: chunks.len() as u32,
            dimension,
            indexed_at: Utc::now(),
        };

        Ok(Self { document, chunks, embeddings })
    }

    pub fn document(&self) -> &IndexedDocument {
        &self.document
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `top_k` chunks closest to `query`, best first.
    pub fn query_index(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.document.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.document.dimension,
                got: query.len(),
            });
        }

        let results = find_similar(query, &self.embeddings, top_k)
            .into_iter()
            .filter_map(|(i, score)| {
                self.chunks.get(i).map(|chunk| SearchResult {
                    chunk_index: chunk.index,
                    content: chunk.content.clone(),
                    score,
                    token_count: chunk.token_count,
                })
            })
            .collect();

        Ok(results)
    }
}

/// Turns a staged file into a `DocumentIndex`.
#[derive(Clone)]
pub struct IndexBuilder {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingModel>,
    splitter: SplitterConfig,
    batch_size: usize,
    timeout: Duration,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            loader: Arc::new(PdfLoader),
            embedder,
            splitter: SplitterConfig::default(),
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitterConfig) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingModel> {
        Arc::clone(&self.embedder)
    }

    pub fn splitter(&self) -> &SplitterConfig {
        &self.splitter
    }

    /// Load, split, embed and assemble the file at `path`.
    pub async fn build_index(&self, path: &Path, display_name: &str) -> Result<DocumentIndex, IndexError> {
        let document = self.loader.load(path, display_name)?;
        self.build_from_document(document).await
    }

    /// Split, embed and assemble already-extracted text.
    pub async fn build_from_document(&self, document: LoadedDocument) -> Result<DocumentIndex, IndexError> {
        let started = Instant::now();
        let chunked = chunk_document(&document, &self.splitter).map_err(|e| match e {
            ChunkerError::EmptyDocument(name) => IndexError::EmptyDocument(name),
            other => IndexError::Chunker(other),
        })?;
        debug!(file = %chunked.filename, chunks = chunked.chunks.len(), "Split document");

        let embeddings = self.embed_chunks(&chunked.chunks).await?;

        let index = DocumentIndex::new(
            chunked.id,
            chunked.filename,
            chunked.total_tokens,
            chunked.chunks,
            embeddings,
        )?;

        info!(
            file = %index.document().filename,
            chunks = index.len(),
            dimension = index.document().dimension,
            embedder = %self.embedder.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built document index"
        );
        Ok(index)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>, IndexError> {
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = tokio::time::timeout(self.timeout, self.embedder.embed_documents(&texts))
                .await
                .map_err(|_| IndexError::Timeout(self.timeout.as_secs()))??;

            if vectors.len() != texts.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    got: vectors.len(),
                }.into());
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::embeddings::HashingEmbedder;
    use async_trait::async_trait;

    struct TextLoader(&'static str);

    impl DocumentLoader for TextLoader {
        fn load(&self, _path: &Path, display_name: &str) -> Result<LoadedDocument, LoaderError> {
            Ok(LoadedDocument::new(display_name, self.0))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingModel for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            Err(EmbeddingError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingModel for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn chunk(index: u32, content: &str) -> Chunk {
        Chunk {
            index,
            content: content.to_string(),
            start_pos: 0,
            end_pos: content.len(),
            token_count: 1,
        }
    }

    const SOLAR: &str = "Solar panels convert sunlight into electricity.\n\n\
        Wind turbines turn moving air into power.\n\n\
        Batteries store energy for later use.";

    #[tokio::test]
    async fn test_build_and_query() {
        let builder = IndexBuilder::new(Arc::new(HashingEmbedder))
            .with_loader(Arc::new(TextLoader(SOLAR)))
            .with_splitter(SplitterConfig::new(12, 0).unwrap())
            .with_batch_size(2);

        let index = builder.build_index(Path::new("unused.pdf"), "energy.pdf").await.unwrap();
        assert_eq!(index.document().filename, "energy.pdf");
        assert!(index.len() >= 3);

        let query = HashingEmbedder.embed_query("how do wind turbines work").await.unwrap();
        let results = index.query_index(&query, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("Wind turbines"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_empty_document_is_error() {
        let builder = IndexBuilder::new(Arc::new(HashingEmbedder))
            .with_loader(Arc::new(TextLoader("   ")));

        let err = builder.build_index(Path::new("unused.pdf"), "blank.pdf").await.unwrap_err();
        assert!(matches!(err, IndexError::EmptyDocument(ref name) if name == "blank.pdf"));
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let builder = IndexBuilder::new(Arc::new(FailingEmbedder))
            .with_loader(Arc::new(TextLoader(SOLAR)));

        let err = builder.build_index(Path::new("unused.pdf"), "energy.pdf").await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(EmbeddingError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_embedding_timeout() {
        let builder = IndexBuilder::new(Arc::new(SlowEmbedder))
            .with_loader(Arc::new(TextLoader(SOLAR)))
            .with_timeout(Duration::from_millis(20));

        let err = builder.build_index(Path::new("unused.pdf"), "energy.pdf").await.unwrap_err();
        assert!(matches!(err, IndexError::Timeout(_)));
    }

    #[test]
    fn test_index_rejects_mismatched_vectors() {
        let err = DocumentIndex::new(
            "id".to_string(),
            "doc.pdf".to_string(),
            2,
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0]],
        ).unwrap_err();
        assert!(matches!(err, IndexError::Embedding(EmbeddingError::CountMismatch { expected: 2, got: 1 })));

        let err = DocumentIndex::new(
            "id".to_string(),
            "doc.pdf".to_string(),
            2,
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        ).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = DocumentIndex::new(
            "id".to_string(),
            "doc.pdf".to_string(),
            1,
            vec![chunk(0, "a")],
            vec![vec![1.0, 0.0]],
        ).unwrap();

        assert!(matches!(
            index.query_index(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert_eq!(index.query_index(&[1.0, 0.0], 5).unwrap().len(), 1);
    }
}
