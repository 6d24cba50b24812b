//! Token counting for the context budget.

use std::path::Path;

use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, String>;
}

/// GPT-3 byte-pair encoding (`r50k_base`). The vocabulary ships with
/// `tiktoken-rs`, so no file is needed.
pub struct Gpt3TokenCounter {
    bpe: CoreBPE,
}

impl Gpt3TokenCounter {
    pub fn new() -> Result<Self, String> {
        let bpe = tiktoken_rs::r50k_base()
            .map_err(|e| format!("failed to load r50k_base encoding: {}", e))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Gpt3TokenCounter {
    fn count(&self, text: &str) -> Result<usize, String> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}

/// Exact counts from a Hugging Face `tokenizer.json` (GPT-2/GPT-3 BPE for
/// OpenAI chat models).
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| format!("failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> Result<usize, String> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| format!("tokenization failed: {}", e))?;
        Ok(encoding.get_ids().len())
    }
}

/// ~4 bytes per token, rounded up. Only used when `search.estimate_tokens`
/// is set; undercounts non-ASCII text.
#[derive(Debug, Default, Clone, Copy)]
pub struct EstimatedTokenCounter;

impl TokenCounter for EstimatedTokenCounter {
    fn count(&self, text: &str) -> Result<usize, String> {
        Ok(text.len().div_ceil(4))
    }
}
