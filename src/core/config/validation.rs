use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const THRESHOLD_TYPES: [&str; 4] = [
    "percentile",
    "standard_deviation",
    "interquartile",
    "gradient",
];

/// Checks the merged configuration tree before it is deserialized, so errors
/// name the offending key instead of a serde position.
pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_non_empty_string_field(llm, "llm.base_url", "base_url")?;
        validate_non_empty_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_non_empty_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_non_empty_string_field(retrieval, "retrieval.session_id", "session_id")?;
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(
            retrieval,
            "retrieval.history_window",
            "history_window",
            0,
            10_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.max_context_chars",
            "max_context_chars",
            1,
            10_000_000,
        )?;
    }

    if let Some(storage) = expect_optional_object(root, "storage")? {
        validate_non_empty_string_field(storage, "storage.sources_path", "sources_path")?;
        validate_non_empty_string_field(
            storage,
            "storage.vector_store_path",
            "vector_store_path",
        )?;
    }

    if let Some(trainer) = expect_optional_object(root, "trainer")? {
        validate_enum_field(trainer, "trainer.splitter", "splitter", &["semantic", "fixed"])?;
        validate_enum_field(
            trainer,
            "trainer.breakpoint_threshold_type",
            "breakpoint_threshold_type",
            &THRESHOLD_TYPES,
        )?;
        validate_f64_field(
            trainer,
            "trainer.breakpoint_threshold_amount",
            "breakpoint_threshold_amount",
            0.0,
            1_000.0,
        )?;
        validate_u64_field(trainer, "trainer.min_chunk_size", "min_chunk_size", 0, 1_000_000)?;
        validate_u64_field(trainer, "trainer.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(trainer, "trainer.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(trainer, "trainer.embed_batch_size", "embed_batch_size", 1, 2_048)?;
        validate_u64_field(trainer, "trainer.embed_concurrency", "embed_concurrency", 1, 64)?;

        let chunk_size = trainer.get("chunk_size").and_then(Value::as_u64);
        let overlap = trainer.get("chunk_overlap").and_then(Value::as_u64);
        if let (Some(size), Some(overlap)) = (chunk_size, overlap) {
            if overlap >= size {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'trainer.chunk_overlap': must be smaller than chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
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
) -> Result<(), ApiError> {
    let Some(value) = section.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_non_empty_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
