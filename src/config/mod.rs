pub mod validation;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Upstream dialect requests are translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProvider {
    #[default]
    Gemini,
    #[serde(alias = "openai_chat")]
    Openai,
}

impl fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamProvider::Gemini => write!(f, "gemini"),
            UpstreamProvider::Openai => write!(f, "openai"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Overall upstream request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// The single upstream every request is relayed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub provider: UpstreamProvider,
    pub base_url: String,
    /// Literal key, or `env:NAME` to read `NAME` from the environment at load.
    pub api_key: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub model_map: BTreeMap<String, String>,
}

impl UpstreamConfig {
    /// Model to send upstream for a client-requested `model`.
    ///
    /// An explicit mapping wins, then `default_model`, then the name as sent.
    #[must_use]
    pub fn resolve_model<'a>(&'a self, model: &'a str) -> &'a str {
        if let Some(mapped) = self.model_map.get(model) {
            return mapped;
        }
        self.default_model.as_deref().unwrap_or(model)
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Usage accounting and the status snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,
    #[serde(default = "default_context_window")]
    pub context_window: u64,
    #[serde(default = "default_input_cost")]
    pub input_cost_per_million: f64,
    #[serde(default = "default_output_cost")]
    pub output_cost_per_million: f64,
}

fn default_status_dir() -> PathBuf {
    std::env::temp_dir()
}
fn default_context_window() -> u64 {
    1_000_000
}
fn default_input_cost() -> f64 {
    0.30
}
fn default_output_cost() -> f64 {
    2.50
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            status_dir: default_status_dir(),
            context_window: default_context_window(),
            input_cost_per_million: default_input_cost(),
            output_cost_per_million: default_output_cost(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub usage: UsageConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation
/// fails (including an `env:` key whose variable is unset).
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// See [`load_config`].
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = serde_yaml::from_str(contents)?;
    config.upstream.api_key = resolve_api_key(&config.upstream.api_key)?;
    validate_config(&config)?;
    Ok(config)
}

fn resolve_api_key(raw: &str) -> Result<String, ConfigError> {
    let Some(name) = raw.strip_prefix("env:") else {
        return Ok(raw.to_string());
    };
    std::env::var(name.trim()).map_err(|_| {
        ConfigError::Validation(format!(
            "upstream.api_key refers to environment variable '{}' which is not set",
            name.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
upstream:
  base_url: https://generativelanguage.googleapis.com/v1beta
  api_key: test-key
";

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upstream.provider, UpstreamProvider::Gemini);
        assert_eq!(config.usage.context_window, 1_000_000);
    }

    #[test]
    fn test_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.timeout, 180);
        assert_eq!(config.features.log_level, "INFO");
        assert!((config.usage.input_cost_per_million - 0.30).abs() < f64::EPSILON);
        assert!((config.usage.output_cost_per_million - 2.50).abs() < f64::EPSILON);
        assert_eq!(config.usage.status_dir, std::env::temp_dir());
    }

    #[test]
    fn test_provider_serde() {
        let p: UpstreamProvider = serde_yaml::from_str("openai").unwrap();
        assert_eq!(p, UpstreamProvider::Openai);
        assert_eq!(UpstreamProvider::Gemini.to_string(), "gemini");
    }

    #[test]
    fn test_resolve_model() {
        let mut config = parse_config(MINIMAL).unwrap().upstream;
        assert_eq!(config.resolve_model("claude-x"), "claude-x");
        config.default_model = Some("gemini-2.5-flash".into());
        assert_eq!(config.resolve_model("claude-x"), "gemini-2.5-flash");
        config
            .model_map
            .insert("claude-opus".into(), "gemini-3-pro-preview".into());
        assert_eq!(config.resolve_model("claude-opus"), "gemini-3-pro-preview");
    }

    #[test]
    fn test_env_api_key() {
        let missing = r"
upstream:
  base_url: https://example.com
  api_key: env:MESSAGES_RELAY_TEST_UNSET_KEY_1
";
        assert!(matches!(
            parse_config(missing),
            Err(ConfigError::Validation(_))
        ));

        let path_var = "env:PATH";
        let resolved = resolve_api_key(path_var).unwrap();
        assert_eq!(resolved, std::env::var("PATH").unwrap());
    }
}
