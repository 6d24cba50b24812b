use thiserror::Error;

use crate::core::config::ConfigError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(String),
}
