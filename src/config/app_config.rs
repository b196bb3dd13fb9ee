//! Application Configuration - inference, parsing and server settings as TOML
//!
//! Each section implements `Default` with the built-in values from
//! [`super::defaults`], so an empty or missing file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::error::PipelineError;
use crate::pipeline::parsing::ParseMode;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference service addressing and timeouts
    #[serde(default)]
    pub inference: InferenceConfig,

    /// How stage responses are parsed
    #[serde(default)]
    pub parsing: ParsingConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides and validate.
    ///
    /// An explicit path must load successfully. The env-var and working
    /// directory candidates fall back to defaults with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(explicit)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // 1. --config
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded config from --config");
            return Ok(config);
        }

        // 2. Env var
        if let Ok(path) = std::env::var(defaults::CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", defaults::CONFIG_PATH_ENV);
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_PATH_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_PATH_ENV);
            }
        }

        // 3. Working directory
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded config from working directory");
                    return Ok(config);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        // 4. Defaults
        info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings and never fail the load.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse TOML text. Validation is left to [`AppConfig::validate`].
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply `MATERIAL_ORIGIN_*` overrides from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup(defaults::MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            info!(model = %model, "Model overridden from environment");
            self.inference.model = model.trim().to_string();
        }
        if let Some(addr) = lookup(defaults::SERVER_ADDR_ENV).filter(|v| !v.trim().is_empty()) {
            info!(addr = %addr, "Server address overridden from environment");
            self.server.addr = addr.trim().to_string();
        }
    }

    /// Validate all values.
    ///
    /// Rules:
    /// - Model, base URL and API key variable name must be non-empty
    /// - Base URL must use http or https
    /// - Timeouts and the upload limit must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.inference.model.trim().is_empty() {
            errors.push("inference.model must not be empty".to_string());
        }
        let base_url = self.inference.base_url.trim();
        if base_url.is_empty() {
            errors.push("inference.base_url must not be empty".to_string());
        } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(format!(
                "inference.base_url must start with http:// or https:// (got '{base_url}')"
            ));
        }
        if self.inference.api_key_env.trim().is_empty() {
            errors.push("inference.api_key_env must not be empty".to_string());
        }
        if self.inference.stage_timeout_secs == 0 {
            errors.push("inference.stage_timeout_secs must be > 0".to_string());
        }
        if self.inference.connect_timeout_secs == 0 {
            errors.push("inference.connect_timeout_secs must be > 0".to_string());
        }
        if self.server.max_image_bytes == 0 {
            errors.push("server.max_image_bytes must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Inference
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model identifier, e.g. `gemini-2.5-flash`
    #[serde(default = "default_model")]
    pub model: String,

    /// REST API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Bound on each stage's exchange
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            stage_timeout_secs: default_stage_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key_from_env(&self) -> Result<String, PipelineError> {
        resolve_api_key(&self.api_key_env, std::env::var(&self.api_key_env).ok())
    }
}

/// A missing or blank key is a configuration error, raised before any
/// network call.
pub fn resolve_api_key(var_name: &str, value: Option<String>) -> Result<String, PipelineError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        Some(_) => Err(PipelineError::Configuration(format!(
            "{var_name} is set but empty"
        ))),
        None => Err(PipelineError::Configuration(format!(
            "{var_name} is not set; an API key for the inference service is required"
        ))),
    }
}

fn default_model() -> String {
    defaults::MODEL.to_string()
}

fn default_base_url() -> String {
    defaults::BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    defaults::API_KEY_ENV.to_string()
}

fn default_stage_timeout_secs() -> u64 {
    defaults::STAGE_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    defaults::CONNECT_TIMEOUT_SECS
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// `strict` requires the reply to be exactly one list literal;
    /// `lenient` extracts the first list literal from surrounding prose.
    #[serde(default)]
    pub mode: ParseMode,

    /// Reject latitudes outside [-90, 90] and longitudes outside [-180, 180]
    #[serde(default = "default_true")]
    pub validate_coordinate_ranges: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            mode: ParseMode::default(),
            validate_coordinate_ranges: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

fn default_max_image_bytes() -> usize {
    defaults::MAX_IMAGE_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.inference.model, "gemini-2.5-flash");
        assert_eq!(config.inference.stage_timeout_secs, 60);
        assert_eq!(config.parsing.mode, ParseMode::Lenient);
        assert!(config.parsing.validate_coordinate_ranges);
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[inference]
stage_timeout_secs = 15

[parsing]
mode = "strict"
"#,
        )
        .unwrap();
        assert_eq!(config.inference.stage_timeout_secs, 15);
        assert_eq!(config.inference.model, "gemini-2.5-flash");
        assert_eq!(config.parsing.mode, ParseMode::Strict);
        assert!(config.parsing.validate_coordinate_ranges);
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = AppConfig::default();
        config.inference.model = "gemini-2.0-pro".to_string();
        let text = config.to_toml().unwrap();
        let back = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.inference.model, "gemini-2.0-pro");
    }

    #[test]
    fn validation_collects_every_error() {
        let mut config = AppConfig::default();
        config.inference.model = " ".to_string();
        config.inference.base_url = "ftp://example.com".to_string();
        config.inference.stage_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_overrides_apply_and_ignore_blank_values() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "MATERIAL_ORIGIN_MODEL" => Some("gemini-2.5-pro".to_string()),
            "MATERIAL_ORIGIN_SERVER_ADDR" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.inference.model, "gemini-2.5-pro");
        assert_eq!(config.server.addr, "0.0.0.0:8080");
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = resolve_api_key("GEMINI_API_KEY", None).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = resolve_api_key("GEMINI_API_KEY", Some("   ".to_string())).unwrap_err();
        assert!(err.to_string().contains("empty"));

        assert_eq!(
            resolve_api_key("GEMINI_API_KEY", Some(" abc ".to_string())).unwrap(),
            "abc"
        );
    }
}
