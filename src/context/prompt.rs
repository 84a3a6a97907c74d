//! Question-answering prompt template.

use super::budget::PromptBudget;
use super::tokens::count_tokens;
use crate::documents::SearchResult;

const TEMPLATE_HEAD: &str = "Context information is below.\n---------------------\n";
const TEMPLATE_MID: &str = "\n---------------------\nGiven the context information and not prior knowledge, answer the query.\nQuery: ";
const TEMPLATE_TAIL: &str = "\nAnswer: ";

/// Render the prompt for already-fitted context pieces.
pub fn render_prompt(context: &[String], question: &str) -> String {
    let context_str = context.join("\n\n");
    let mut prompt = String::with_capacity(
        TEMPLATE_HEAD.len() + context_str.len() + TEMPLATE_MID.len() + question.len() + TEMPLATE_TAIL.len(),
    );
    prompt.push_str(TEMPLATE_HEAD);
    prompt.push_str(&context_str);
    prompt.push_str(TEMPLATE_MID);
    prompt.push_str(question);
    prompt.push_str(TEMPLATE_TAIL);
    prompt
}

/// Tokens used by the template and the question, excluding context.
pub fn prompt_overhead(question: &str) -> u32 {
    count_tokens(&render_prompt(&[], question))
}

/// Build a prompt from retrieved results, trimming context to the budget.
pub fn build_prompt(results: &[SearchResult], question: &str, budget: &PromptBudget) -> String {
    let available = budget.context_budget(prompt_overhead(question));
    let context = budget.fit_context(results, available);
    render_prompt(&context, question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_layout() {
        let prompt = render_prompt(&["first".to_string(), "second".to_string()], "What is it?");
        assert!(prompt.starts_with("Context information is below."));
        assert!(prompt.contains("first\n\nsecond"));
        assert!(prompt.contains("Query: What is it?\n"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn test_build_prompt_respects_budget() {
        let long = "sentence with several words in it. ".repeat(400);
        let results = vec![SearchResult {
            chunk_index: 0,
            content: long.clone(),
            score: 1.0,
            token_count: count_tokens(&long),
        }];
        let budget = PromptBudget::new(512, 100);

        let prompt = build_prompt(&results, "Why?", &budget);
        assert!(count_tokens(&prompt) <= budget.prompt_budget() + 8);
        assert!(prompt.contains("Query: Why?"));
    }
}
