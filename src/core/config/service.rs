use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::{discover_project_root, AppPaths};
use super::settings::{apply_env_overrides, Settings};
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 18] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "auth_",
    "_auth",
    "oauth",
    "jwt",
    "access_key",
    "client_id",
    "client_secret",
    "access_token",
    "refresh_token",
    "auth_token",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 7] = [
    "max_tokens",
    "total_tokens",
    "input_tokens",
    "output_tokens",
    "token_count",
    "tokenizer",
    "tokens",
];

/// Outcome of loading `env.config`, kept until logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFileStatus {
    Absent(PathBuf),
    Loaded(PathBuf),
    Failed(PathBuf, String),
}

impl EnvFileStatus {
    pub fn log(&self) {
        match self {
            EnvFileStatus::Absent(path) => {
                tracing::debug!("No env file at {}", path.display())
            }
            EnvFileStatus::Loaded(path) => {
                tracing::info!("Loaded environment from {}", path.display())
            }
            EnvFileStatus::Failed(path, err) => {
                tracing::warn!("Failed to read {}: {}", path.display(), err)
            }
        }
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("QABOT_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// `QABOT_ENV_FILE`, else `env.config` in the project root.
    pub fn env_file_path() -> PathBuf {
        if let Ok(path) = env::var("QABOT_ENV_FILE") {
            return PathBuf::from(path);
        }
        discover_project_root().join("env.config")
    }

    /// Loads `env.config` (dotenv syntax) into the process environment.
    ///
    /// Runs before `AppPaths` and logging exist, so `QABOT_ROOT` and
    /// `QABOT_DATA_DIR` may come from the file. Variables already set in the
    /// environment win over the file.
    pub fn load_env_file() -> EnvFileStatus {
        Self::load_env_file_from(&Self::env_file_path())
    }

    pub fn load_env_file_from(path: &Path) -> EnvFileStatus {
        if !path.exists() {
            return EnvFileStatus::Absent(path.to_path_buf());
        }
        match dotenv::from_path(path) {
            Ok(()) => EnvFileStatus::Loaded(path.to_path_buf()),
            Err(err) => EnvFileStatus::Failed(path.to_path_buf(), err.to_string()),
        }
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        let merged = deep_merge(&public_config, &secrets_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn load_settings(&self) -> Result<Settings, ApiError> {
        self.load_settings_with(|key| env::var(key).ok())
    }

    /// Resolves settings from files, then the given environment lookup.
    pub fn load_settings_with<F>(&self, lookup: F) -> Result<Settings, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let merged = self.load_config()?;
        let mut settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))?;
        apply_env_overrides(&mut settings, lookup)?;

        let resolved = serde_json::to_value(&settings).map_err(ApiError::internal)?;
        validate_config(&resolved)?;
        Ok(settings)
    }

    pub fn redact_sensitive_values(value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => match value {
                Value::Object(_) => value,
                _ => Value::Object(Map::new()),
            },
            Err(err) => {
                tracing::warn!("Ignoring malformed YAML in {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(err) => {
            tracing::warn!("Failed to read {}: {}", path.display(), err);
            Value::Object(Map::new())
        }
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "api_key": "secret",
            "nested": {
                "refresh_token": "refresh",
                "max_tokens": 42
            },
            "items": [
                { "password": "pw" }
            ]
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "api_key": "****",
                "nested": {
                    "refresh_token": "****",
                    "max_tokens": 42
                },
                "items": [
                    { "password": "****" }
                ]
            })
        );
    }

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths::with_dirs(dir.to_path_buf(), dir.join("data"));
        ConfigService::new(Arc::new(paths))
    }

    #[test]
    fn load_settings_merges_secrets_over_public_config() {
        let tmp = tempfile::tempdir().unwrap();
        // creates data/, where secrets.yaml lives
        let service = service_in(tmp.path());
        fs::write(
            tmp.path().join("config.yml"),
            "llm:\n  chat_model: gpt-4o-mini\nretrieval:\n  top_k: 6\n",
        )
        .unwrap();
        fs::write(service.secrets_path(), "llm:\n  api_key: sk-from-secrets\n").unwrap();

        let settings = service.load_settings_with(|_| None).unwrap();

        assert_eq!(settings.llm.chat_model, "gpt-4o-mini");
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-from-secrets"));
        assert_eq!(settings.retrieval.top_k, 6);
        assert_eq!(settings.retrieval.history_window, 5);
    }

    #[test]
    fn load_settings_applies_env_after_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.yml"), "llm:\n  temperature: 0.2\n").unwrap();

        let settings = service_in(tmp.path())
            .load_settings_with(|key| (key == "TEMPERATURE").then(|| "0.7".to_string()))
            .unwrap();

        assert_eq!(settings.llm.temperature, 0.7);
    }

    #[test]
    fn env_value_out_of_range_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();

        let err = service_in(tmp.path())
            .load_settings_with(|key| (key == "TEMPERATURE").then(|| "9".to_string()))
            .unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("llm.temperature")));
    }

    #[test]
    fn env_file_is_loaded_into_the_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("env.config");
        fs::write(&path, "QABOT_ENV_FILE_TEST_DATA_DIR=/srv/qabot\n").unwrap();

        let status = ConfigService::load_env_file_from(&path);

        assert_eq!(status, EnvFileStatus::Loaded(path));
        assert_eq!(
            env::var("QABOT_ENV_FILE_TEST_DATA_DIR").as_deref(),
            Ok("/srv/qabot")
        );
    }

    #[test]
    fn missing_env_file_is_reported_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("env.config");

        assert_eq!(
            ConfigService::load_env_file_from(&path),
            EnvFileStatus::Absent(path)
        );
    }

    #[test]
    fn missing_files_yield_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = service_in(tmp.path()).load_settings_with(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
