//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `RagEngine`: moderates, embeds, retrieves and opens the streamed answer
//! - `SectionStore` / `SupabaseStore`: similarity search over documentation sections
//! - `build_context` and `generate_prompt`: token-budgeted prompt assembly

mod context_builder;
mod engine;
mod prompt;
mod store;
mod supabase;
mod tokenizer;

pub use context_builder::{build_context, ContextText, SECTION_SEPARATOR};
pub use engine::{sanitize_query, RagEngine, INVALID_QUERY_MESSAGE};
pub use prompt::{generate_prompt, PREAMBLE};
pub use store::{MatchParams, PageSection, SectionStore};
pub use supabase::SupabaseStore;
pub use tokenizer::{EstimatedTokenCounter, Gpt3TokenCounter, HfTokenCounter, TokenCounter};
