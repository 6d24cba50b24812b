use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Credentials, SearchSettings, ServerSettings};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{
    EstimatedTokenCounter, Gpt3TokenCounter, HfTokenCounter, RagEngine, SectionStore,
    SupabaseStore, TokenCounter,
};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// Holds only read-only handles; every request builds its own pipeline
/// values and nothing is mutated between requests.
#[derive(Clone)]
pub struct AppState {
    pub server: ServerSettings,
    pub engine: Arc<RagEngine>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading and validating configuration
    /// 2. Resolving credentials for OpenAI and Supabase
    /// 3. Loading the tokenizer used for the context budget
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths);
        let raw = config.load_config()?;
        tracing::info!(
            "Loaded config from {}: {}",
            config.config_path().display(),
            config.redact_sensitive_values(&raw)
        );

        let settings = SearchSettings::from_config(&raw);
        let server = ServerSettings::from_config(&raw);
        let credentials = Credentials::resolve(&raw)?;

        let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
            credentials.openai_base_url.clone(),
            credentials.openai_api_key.clone(),
        ));
        tracing::info!(
            provider = llm.name(),
            base_url = %credentials.openai_base_url,
            "Using LLM provider"
        );
        let store: Arc<dyn SectionStore> = Arc::new(SupabaseStore::new(
            credentials.supabase_url.clone(),
            credentials.supabase_service_role_key.clone(),
        ));
        let tokenizer = load_token_counter(&settings)?;

        let engine = Arc::new(RagEngine::new(llm, store, tokenizer, settings));

        Ok(Arc::new(AppState { server, engine }))
    }

    /// Builds state around an already assembled engine.
    pub fn with_engine(server: ServerSettings, engine: RagEngine) -> Arc<Self> {
        Arc::new(AppState {
            server,
            engine: Arc::new(engine),
        })
    }
}

fn load_token_counter(
    settings: &SearchSettings,
) -> Result<Arc<dyn TokenCounter>, InitializationError> {
    if let Some(path) = &settings.tokenizer_path {
        let counter = HfTokenCounter::from_file(path).map_err(InitializationError::Tokenizer)?;
        tracing::info!("Loaded tokenizer from {}", path.display());
        return Ok(Arc::new(counter));
    }
    if settings.estimate_tokens {
        tracing::warn!("search.estimate_tokens is set; token counts are approximate");
        return Ok(Arc::new(EstimatedTokenCounter));
    }
    let counter = Gpt3TokenCounter::new().map_err(InitializationError::Tokenizer)?;
    tracing::info!("Counting context tokens with the GPT-3 (r50k_base) encoding");
    Ok(Arc::new(counter))
}
