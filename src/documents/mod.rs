//! Document Pipeline
//!
//! Upload intake, text extraction, chunking, embedding, indexing and
//! question answering over a single PDF.

pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod intake;
pub mod loader;
pub mod query;

// Re-export key public types
pub use chunker::{chunk_document, split_text, Chunk, ChunkedDocument, ChunkerError, SplitterConfig};
pub use embeddings::{cosine_similarity, Embedding, EmbeddingError, EmbeddingModel, HashingEmbedder};
pub use index::{DocumentIndex, IndexBuilder, IndexError, IndexedDocument, SearchResult};
pub use intake::{select_upload, IntakeError, StagedDocument, UploadedFile};
pub use loader::{load_pdf, DocumentLoader, LoadedDocument, LoaderError, PdfLoader};
pub use query::{Answer, GenerationError, LanguageModel, QueryEngine, QueryError, QueryOptions};
