//! Prompt Budget Management
//!
//! Fits retrieved context into the language model's context window,
//! reserving room for the generated answer.

use serde::{Deserialize, Serialize};

use super::tokens::{count_tokens, truncate_to_tokens};
use crate::documents::SearchResult;

/// Context window of llama2-7b-chat
pub const DEFAULT_CONTEXT_WINDOW: u32 = 4_096;

/// Tokens kept free for tokenizer disagreement between cl100k_base and the
/// model's own vocabulary.
pub const SAFETY_MARGIN: u32 = 64;

/// Token budget for one question-answering prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBudget {
    /// Total context window of the model
    pub context_window: u32,
    /// Reserved for output generation
    pub output_reserved: u32,
}

impl PromptBudget {
    pub fn new(context_window: u32, output_reserved: u32) -> Self {
        Self { context_window, output_reserved }
    }

    /// Tokens available to the prompt as a whole
    pub fn prompt_budget(&self) -> u32 {
        self.context_window
            .saturating_sub(self.output_reserved)
            .saturating_sub(SAFETY_MARGIN)
    }

    /// Tokens left for retrieved context once the template and question
    /// (`overhead`) are accounted for.
    pub fn context_budget(&self, overhead: u32) -> u32 {
        self.prompt_budget().saturating_sub(overhead)
    }

    /// Select context from `results` (highest score first) that fits in
    /// `available` tokens.
    ///
    /// Whole chunks are kept in score order until the next one no longer
    /// fits; that chunk is then truncated into the remaining space. Chunks
    /// after it are dropped.
    pub fn fit_context(&self, results: &[SearchResult], available: u32) -> Vec<String> {
        let mut selected = Vec::new();
        let mut remaining = available;

        for result in results {
            if remaining == 0 {
                break;
            }
            // Chunks are joined by a blank line
            let separator = if selected.is_empty() { 0 } else { 1 };
            let cost = count_tokens(&result.content) + separator;

            if cost <= remaining {
                remaining -= cost;
                selected.push(result.content.clone());
                continue;
            }

            let truncated = truncate_to_tokens(&result.content, remaining.saturating_sub(separator));
            if !truncated.trim().is_empty() {
                selected.push(truncated);
            }
            break;
        }

        selected
    }
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW, crate::config::DEFAULT_MAX_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: u32, content: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_index: index,
            content: content.to_string(),
            score,
            token_count: count_tokens(content),
        }
    }

    #[test]
    fn test_default_budget() {
        let budget = PromptBudget::default();
        assert_eq!(budget.prompt_budget(), 4_096 - 400 - SAFETY_MARGIN);
        assert_eq!(budget.context_budget(100), 4_096 - 400 - SAFETY_MARGIN - 100);
    }

    #[test]
    fn test_budget_saturates() {
        let budget = PromptBudget::new(100, 400);
        assert_eq!(budget.prompt_budget(), 0);
        assert_eq!(budget.context_budget(50), 0);
    }

    #[test]
    fn test_fit_context_all_fit() {
        let budget = PromptBudget::default();
        let results = vec![result(0, "alpha beta", 0.9), result(1, "gamma delta", 0.5)];
        let fitted = budget.fit_context(&results, 1_000);
        assert_eq!(fitted, vec!["alpha beta".to_string(), "gamma delta".to_string()]);
    }

    #[test]
    fn test_fit_context_truncates_last() {
        let budget = PromptBudget::default();
        let long = "word ".repeat(200);
        let results = vec![result(0, "short chunk", 0.9), result(1, &long, 0.5), result(2, "never", 0.1)];
        let first_cost = count_tokens("short chunk");

        let fitted = budget.fit_context(&results, first_cost + 11);
        assert_eq!(fitted.len(), 2);
        assert_eq!(fitted[0], "short chunk");
        assert!(count_tokens(&fitted[1]) <= 10);
    }

    #[test]
    fn test_fit_context_zero_budget() {
        let budget = PromptBudget::default();
        let results = vec![result(0, "anything", 0.9)];
        assert!(budget.fit_context(&results, 0).is_empty());
    }
}
