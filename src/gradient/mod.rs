//! Gradient Integration
//!
//! Hosted embeddings and completions used to index documents and answer
//! questions.

pub mod client;
pub mod models;

pub use client::{BaseModel, GradientClient, GradientError};
pub use models::{GradientEmbedding, GradientLlm};
