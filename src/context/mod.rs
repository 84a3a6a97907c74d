//! Context Management Module
//!
//! Token counting, prompt budgeting and the question-answering template used
//! to turn retrieved chunks into a single model call.

pub mod budget;
pub mod prompt;
pub mod tokens;

pub use budget::{PromptBudget, DEFAULT_CONTEXT_WINDOW};
pub use prompt::{build_prompt, render_prompt};
pub use tokens::{count_tokens, count_tokens_batch, estimate_tokens_quick, truncate_to_tokens};
