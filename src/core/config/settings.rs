use std::env;
use std::path::PathBuf;

use serde_json::Value;

use super::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.78;
pub const DEFAULT_MATCH_COUNT: u32 = 10;
pub const DEFAULT_MIN_CONTENT_LENGTH: u32 = 50;
pub const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 1500;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PORT: u16 = 3000;

/// Knobs of the retrieval pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub embedding_model: String,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub match_threshold: f64,
    pub match_count: u32,
    pub min_content_length: u32,
    pub context_token_budget: usize,
    /// `tokenizer.json` to count with instead of the bundled GPT-3 encoding.
    pub tokenizer_path: Option<PathBuf>,
    /// Count ~4 bytes per token instead of tokenizing.
    pub estimate_tokens: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            match_count: DEFAULT_MATCH_COUNT,
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            context_token_budget: DEFAULT_CONTEXT_TOKEN_BUDGET,
            tokenizer_path: None,
            estimate_tokens: false,
        }
    }
}

impl SearchSettings {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        let Some(search) = config.get("search") else {
            return defaults;
        };

        Self {
            embedding_model: string_at(search, "embedding_model")
                .unwrap_or(defaults.embedding_model),
            chat_model: string_at(search, "chat_model").unwrap_or(defaults.chat_model),
            max_tokens: search
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(defaults.max_tokens),
            temperature: search
                .get("temperature")
                .and_then(|v| v.as_f64())
                .unwrap_or(defaults.temperature),
            match_threshold: search
                .get("match_threshold")
                .and_then(|v| v.as_f64())
                .unwrap_or(defaults.match_threshold),
            match_count: search
                .get("match_count")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(defaults.match_count),
            min_content_length: search
                .get("min_content_length")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(defaults.min_content_length),
            context_token_budget: search
                .get("context_token_budget")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(defaults.context_token_budget),
            tokenizer_path: string_at(search, "tokenizer_path").map(PathBuf::from),
            estimate_tokens: search
                .get("estimate_tokens")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.estimate_tokens),
        }
    }
}

/// Secrets and endpoints for the upstream services.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_base_url", &self.openai_base_url)
            .field("supabase_url", &self.supabase_url)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Environment variables win over the merged config/secrets files.
    pub fn resolve(config: &Value) -> Result<Self, ConfigError> {
        let openai = config.get("openai").unwrap_or(&Value::Null);
        let supabase = config.get("supabase").unwrap_or(&Value::Null);

        let openai_api_key = env_any(&["OPENAI_KEY", "OPENAI_API_KEY"])
            .or_else(|| string_at(openai, "api_key"))
            .ok_or(ConfigError::Missing("openai.api_key"))?;
        let openai_base_url = env_any(&["OPENAI_BASE_URL"])
            .or_else(|| string_at(openai, "base_url"))
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let supabase_url = env_any(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
            .or_else(|| string_at(supabase, "url"))
            .ok_or(ConfigError::Missing("supabase.url"))?;
        let supabase_service_role_key = env_any(&["SUPABASE_SERVICE_ROLE_KEY"])
            .or_else(|| string_at(supabase, "service_role_key"))
            .ok_or(ConfigError::Missing("supabase.service_role_key"))?;

        Ok(Self {
            openai_api_key,
            openai_base_url,
            supabase_url,
            supabase_service_role_key,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerSettings {
    pub fn from_config(config: &Value) -> Self {
        let server = config.get("server").unwrap_or(&Value::Null);

        let port = env::var("PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .or_else(|| server.get("port").and_then(|v| v.as_u64()).map(|v| v as u16))
            .unwrap_or(DEFAULT_PORT);

        let origins = server
            .get("cors_allowed_origins")
            .and_then(|value| value.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|item| item.as_str())
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| item.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Self {
            host: string_at(server, "host").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            cors_allowed_origins: if origins.is_empty() {
                default_local_origins()
            } else {
                origins
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn string_at(section: &Value, key: &str) -> Option<String> {
    section
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .map(|val| val.trim().to_string())
        .find(|val| !val.is_empty())
}
