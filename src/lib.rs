// docchat library
// Exports core modules for use by both the REPL and the JSON CLI binary

pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod documents;
pub mod gradient;
pub mod session;

// Re-export commonly used types for the binaries
pub use chat::ChatRenderer;
pub use config::{ConfigError, GradientCredentials, Settings};
pub use context::tokens::{count_tokens, count_tokens_batch, estimate_tokens_quick};
pub use context::{PromptBudget, DEFAULT_CONTEXT_WINDOW};

pub use documents::{
    split_text, Answer, Chunk, DocumentIndex, EmbeddingModel, HashingEmbedder, IndexBuilder,
    IndexError, IndexedDocument, IntakeError, LanguageModel, QueryEngine, QueryError, QueryOptions,
    SearchResult, SplitterConfig, UploadedFile,
};

pub use gradient::{GradientClient, GradientEmbedding, GradientError, GradientLlm};

pub use session::{
    Message, MessageRole, Pipeline, Session, SessionError, Transcript, TurnOutcome,
    ASSISTANT_MARKER, UPLOAD_PROMPT, USER_MARKER,
};
