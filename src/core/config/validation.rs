use serde_json::{Map, Value};

use super::ConfigError;

pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(search) = expect_optional_object(root, "search")? {
        validate_optional_string_field(search, "search.embedding_model", "embedding_model")?;
        validate_optional_string_field(search, "search.chat_model", "chat_model")?;
        validate_optional_string_field(search, "search.tokenizer_path", "tokenizer_path")?;
        validate_bool_field(search, "search.estimate_tokens", "estimate_tokens")?;
        validate_u64_field(search, "search.max_tokens", "max_tokens", 1, 32_768)?;
        validate_f64_field(search, "search.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(search, "search.match_threshold", "match_threshold", 0.0, 1.0)?;
        validate_u64_field(search, "search.match_count", "match_count", 1, 1_000)?;
        validate_u64_field(
            search,
            "search.min_content_length",
            "min_content_length",
            0,
            1_000_000,
        )?;
        validate_u64_field(
            search,
            "search.context_token_budget",
            "context_token_budget",
            1,
            1_000_000,
        )?;
    }

    if let Some(openai) = expect_optional_object(root, "openai")? {
        validate_optional_string_field(openai, "openai.base_url", "base_url")?;
        validate_optional_string_field(openai, "openai.api_key", "api_key")?;
    }

    if let Some(supabase) = expect_optional_object(root, "supabase")? {
        validate_optional_string_field(supabase, "supabase.url", "url")?;
        validate_optional_string_field(
            supabase,
            "supabase.service_role_key",
            "service_role_key",
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid {
            path: path.to_string(),
            reason: "value cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    match section.get(key) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "boolean")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, index);
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&item_path, "string"));
        };
        if text.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: item_path,
                reason: "value cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

fn range_error<T: std::fmt::Display>(path: &str, min: T, max: T) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("must be between {} and {}", min, max),
    }
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("expected {}", expected),
    }
}
