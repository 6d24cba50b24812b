pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

use thiserror::Error;

pub use paths::AppPaths;
pub use service::ConfigService;
pub use settings::{Credentials, SearchSettings, ServerSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config at '{path}': {reason}")]
    Invalid { path: String, reason: String },

    #[error("Missing required setting '{0}' (set it in secrets.yaml or the environment)")]
    Missing(&'static str),
}
