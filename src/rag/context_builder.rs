//! Context assembly under a token budget.
//!
//! Sections are taken in ranked order. Each one adds the token count of its
//! raw content to a running total; the first section that brings the total
//! to the budget is dropped together with everything after it.

use super::store::PageSection;
use super::tokenizer::TokenCounter;

pub const SECTION_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq)]
pub struct ContextText {
    pub text: String,
    /// Sections that made it into `text`.
    pub included: usize,
    /// Tokens of the included sections.
    pub tokens: usize,
}

pub fn build_context(
    sections: &[PageSection],
    counter: &dyn TokenCounter,
    token_budget: usize,
) -> Result<ContextText, String> {
    let mut text = String::new();
    let mut token_count = 0;
    let mut included = 0;

    for section in sections {
        let section_tokens = counter.count(&section.content)?;
        if token_count + section_tokens >= token_budget {
            break;
        }
        token_count += section_tokens;

        text.push_str(section.content.trim());
        text.push_str(SECTION_SEPARATOR);
        included += 1;
    }

    Ok(ContextText {
        text,
        included,
        tokens: token_count,
    })
}
