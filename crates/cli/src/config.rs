//! Service configuration: an optional TOML file overridden by environment
//! variables.
//!
//! ```toml
//! [gemini]
//! model = "gemini-2.0-flash"
//! temperature = 0.7
//! timeout_secs = 30
//!
//! [storage]
//! bucket = "gameplay-files"
//! namespace = "default-app-id"
//! data_dir = "./playcoach-data"
//! public_url = "http://localhost:8080/files"
//!
//! [auth]
//! tokens = "dev-token=player-1"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use playcoach_core::{PromptOptions, DEFAULT_TEMPERATURE};
use playcoach_pipeline::{
    GeminiConfig, IdentityConfigError, StaticTokenIdentity, API_KEY_VAR, DEFAULT_GEMINI_URL,
    DEFAULT_MODEL, DEFAULT_TIMEOUT,
};
use serde::Deserialize;

pub(crate) const GEMINI_URL_VAR: &str = "PLAYCOACH_GEMINI_URL";
pub(crate) const MODEL_VAR: &str = "PLAYCOACH_MODEL";
pub(crate) const TEMPERATURE_VAR: &str = "PLAYCOACH_TEMPERATURE";
pub(crate) const TIMEOUT_VAR: &str = "PLAYCOACH_TIMEOUT_SECS";
pub(crate) const BUCKET_VAR: &str = "PLAYCOACH_BUCKET";
pub(crate) const NAMESPACE_VAR: &str = "PLAYCOACH_NAMESPACE";
pub(crate) const DATA_DIR_VAR: &str = "PLAYCOACH_DATA_DIR";
pub(crate) const PUBLIC_URL_VAR: &str = "PLAYCOACH_PUBLIC_URL";
pub(crate) const TOKENS_VAR: &str = "PLAYCOACH_TOKENS";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {variable}: {message}")]
    InvalidValue {
        variable: String,
        value: String,
        message: String,
    },

    #[error(transparent)]
    Identity(#[from] IdentityConfigError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) gemini: GeminiSection,
    pub(crate) storage: StorageSection,
    pub(crate) auth: AuthSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GeminiSection {
    /// Normally supplied through `GEMINI_API_KEY` rather than the file.
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) temperature: f32,
    pub(crate) timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StorageSection {
    pub(crate) bucket: String,
    pub(crate) namespace: String,
    pub(crate) data_dir: PathBuf,
    pub(crate) public_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AuthSection {
    /// `token=user` pairs, comma separated.
    pub(crate) tokens: String,
}

impl Default for GeminiSection {
    fn default() -> Self {
        GeminiSection {
            api_key: None,
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            bucket: "gameplay-files".to_string(),
            namespace: "default-app-id".to_string(),
            data_dir: PathBuf::from("./playcoach-data"),
            public_url: "http://localhost:8080/files".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gemini: GeminiSection::default(),
            storage: StorageSection::default(),
            auth: AuthSection::default(),
        }
    }
}

impl Config {
    /// Read `path` if given, then apply process environment overrides.
    pub(crate) fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub(crate) fn from_toml(content: &str) -> Result<Config, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_VAR) {
            self.gemini.api_key = Some(key);
        }
        if let Some(url) = lookup(GEMINI_URL_VAR) {
            self.gemini.base_url = url;
        }
        if let Some(model) = lookup(MODEL_VAR) {
            self.gemini.model = model;
        }
        if let Some(raw) = lookup(TEMPERATURE_VAR) {
            self.gemini.temperature = parse_temperature(&raw)?;
        }
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            self.gemini.timeout_secs = parse_timeout(&raw)?;
        }
        if let Some(bucket) = lookup(BUCKET_VAR) {
            self.storage.bucket = bucket;
        }
        if let Some(namespace) = lookup(NAMESPACE_VAR) {
            self.storage.namespace = namespace;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(PUBLIC_URL_VAR) {
            self.storage.public_url = url;
        }
        if let Some(tokens) = lookup(TOKENS_VAR) {
            self.auth.tokens = tokens;
        }
        Ok(())
    }

    pub(crate) fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: self.gemini.base_url.clone(),
            model: self.gemini.model.clone(),
            timeout: Duration::from_secs(self.gemini.timeout_secs),
        }
    }

    pub(crate) fn prompt_options(&self) -> PromptOptions {
        PromptOptions {
            temperature: self.gemini.temperature,
        }
    }

    pub(crate) fn identity(&self) -> Result<StaticTokenIdentity, ConfigError> {
        Ok(StaticTokenIdentity::parse(&self.auth.tokens)?)
    }

    /// `<data_dir>/<namespace>.jsonl`
    pub(crate) fn journal_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(format!("{}.jsonl", self.storage.namespace))
    }

    /// Root under which bucket directories are created.
    pub(crate) fn objects_root(&self) -> PathBuf {
        self.storage.data_dir.join("objects")
    }
}

fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        variable: TEMPERATURE_VAR.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };
    let value: f32 = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("must be a non-negative number"));
    }
    Ok(value)
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        variable: TIMEOUT_VAR.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be at least 1")),
        Ok(secs) => Ok(secs),
        Err(_) => Err(invalid("not a whole number of seconds")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.timeout_secs, 30);
        assert_eq!(config.storage.bucket, "gameplay-files");
        assert_eq!(config.storage.namespace, "default-app-id");
        assert_eq!(
            config.journal_path(),
            PathBuf::from("./playcoach-data/default-app-id.jsonl")
        );
        assert!(config.gemini_config().api_key.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [gemini]
            model = "gemini-test"

            [storage]
            namespace = "tenant-a"
            "#,
        )
        .unwrap();
        assert_eq!(config.gemini.model, "gemini-test");
        assert_eq!(config.gemini.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.storage.namespace, "tenant-a");
        assert_eq!(config.storage.bucket, "gameplay-files");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml("[gemini]\nmodle = \"typo\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml("[storage]\nbucket = \"from-file\"").unwrap();
        config
            .apply_overrides(env(&[
                (API_KEY_VAR, "secret"),
                (BUCKET_VAR, "from-env"),
                (TIMEOUT_VAR, "5"),
                (TEMPERATURE_VAR, "0.2"),
                (TOKENS_VAR, "tok=alice"),
            ]))
            .unwrap();

        assert_eq!(config.storage.bucket, "from-env");
        let gemini = config.gemini_config();
        assert_eq!(gemini.api_key.as_deref(), Some("secret"));
        assert_eq!(gemini.timeout, Duration::from_secs(5));
        assert_eq!(config.prompt_options().temperature, 0.2);
        assert_eq!(config.identity().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let mut config = Config::default();
        config.apply_overrides(env(&[(API_KEY_VAR, "")])).unwrap();
        assert!(config.gemini_config().api_key.is_none());
    }

    #[test]
    fn test_invalid_numbers_name_the_variable() {
        let mut config = Config::default();
        match config.apply_overrides(env(&[(TIMEOUT_VAR, "soon")])) {
            Err(ConfigError::InvalidValue { variable, .. }) => assert_eq!(variable, TIMEOUT_VAR),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
        assert!(config.apply_overrides(env(&[(TIMEOUT_VAR, "0")])).is_err());

        match config.apply_overrides(env(&[(TEMPERATURE_VAR, "hot")])) {
            Err(ConfigError::InvalidValue { variable, .. }) => {
                assert_eq!(variable, TEMPERATURE_VAR)
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_tokens() {
        let mut config = Config::default();
        config.auth.tokens = "no-equals-sign".to_string();
        assert!(matches!(config.identity(), Err(ConfigError::Identity(_))));
    }
}
