//! ABOUTME: Central configuration management for agentflow
//! ABOUTME: Handles TOML parsing, validation, and environment variable overrides

pub mod logging;

pub use logging::init_logging;

use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "AGENTFLOW_";

/// Configuration errors; invalid settings refuse to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Global agentflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible chat API.
    pub llm_base_url: String,
    /// Credential sent to the endpoint; a placeholder for local servers.
    pub llm_api_key: String,
    /// Model identifier sent in requests.
    pub llm_model: String,
    /// Per-request timeout in seconds.
    pub llm_timeout_secs: u64,
    /// Retry budget for transient failures.
    pub llm_max_retries: u32,
    pub llm_retry_initial_delay_secs: f64,
    pub llm_retry_max_delay_secs: f64,
    pub llm_circuit_breaker_threshold: u32,
    pub llm_circuit_breaker_timeout_secs: f64,
    pub llm_circuit_breaker_half_open_successes: u32,
    /// Default streaming mode for responses.
    pub llm_stream_responses: bool,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,

    /// Upper bound on parallel node tasks.
    pub max_concurrent_agents: usize,
    /// Filesystem root for generated artifacts.
    pub workspace: PathBuf,
    /// Subdirectory for workflow artifact JSONs.
    pub output_directory: PathBuf,
    /// Location of the durable checkpoint backend; defaults to
    /// `<workspace>/checkpoints` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,

    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Languages advertised in the developer system prompt.
    pub developer_languages: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_base_url: "http://127.0.0.1:8080/v1".to_string(),
            llm_api_key: "not-needed".to_string(),
            llm_model: "devstral".to_string(),
            llm_timeout_secs: 300,
            llm_max_retries: 3,
            llm_retry_initial_delay_secs: 1.0,
            llm_retry_max_delay_secs: 60.0,
            llm_circuit_breaker_threshold: 5,
            llm_circuit_breaker_timeout_secs: 60.0,
            llm_circuit_breaker_half_open_successes: 3,
            llm_stream_responses: true,
            llm_temperature: 0.7,
            llm_max_tokens: 2048,
            max_concurrent_agents: 5,
            workspace: PathBuf::from("."),
            output_directory: PathBuf::from("./output"),
            checkpoint_dir: None,
            log_level: "INFO".to_string(),
            log_file: None,
            developer_languages: vec!["python".to_string()],
        }
    }
}

impl Settings {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load settings from a TOML file, apply environment overrides, and
    /// validate.
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Parse TOML content, apply environment overrides, and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Effective checkpoint directory.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir
            .clone()
            .unwrap_or_else(|| self.workspace.join("checkpoints"))
    }

    fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std_env::var(format!("{ENV_PREFIX}{name}")).ok()
        }
        fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
            var(name).and_then(|v| v.parse().ok())
        }

        if let Some(v) = var("LLM_BASE_URL") {
            self.llm_base_url = v;
        }
        if let Some(v) = var("LLM_API_KEY") {
            self.llm_api_key = v;
        }
        if let Some(v) = var("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = parse_var("LLM_TIMEOUT_SECS") {
            self.llm_timeout_secs = v;
        }
        if let Some(v) = parse_var("LLM_MAX_RETRIES") {
            self.llm_max_retries = v;
        }
        if let Some(v) = parse_var("LLM_RETRY_INITIAL_DELAY_SECS") {
            self.llm_retry_initial_delay_secs = v;
        }
        if let Some(v) = parse_var("LLM_RETRY_MAX_DELAY_SECS") {
            self.llm_retry_max_delay_secs = v;
        }
        if let Some(v) = parse_var("LLM_CIRCUIT_BREAKER_THRESHOLD") {
            self.llm_circuit_breaker_threshold = v;
        }
        if let Some(v) = parse_var("LLM_CIRCUIT_BREAKER_TIMEOUT_SECS") {
            self.llm_circuit_breaker_timeout_secs = v;
        }
        if let Some(v) = parse_var("LLM_CIRCUIT_BREAKER_HALF_OPEN") {
            self.llm_circuit_breaker_half_open_successes = v;
        }
        if let Some(v) = parse_var("LLM_STREAM_RESPONSES") {
            self.llm_stream_responses = v;
        }
        if let Some(v) = parse_var("LLM_TEMPERATURE") {
            self.llm_temperature = v;
        }
        if let Some(v) = parse_var("LLM_MAX_TOKENS") {
            self.llm_max_tokens = v;
        }
        if let Some(v) = parse_var("MAX_CONCURRENT_AGENTS") {
            self.max_concurrent_agents = v;
        }
        if let Some(v) = var("WORKSPACE") {
            self.workspace = PathBuf::from(v);
        }
        if let Some(v) = var("OUTPUT_DIRECTORY") {
            self.output_directory = PathBuf::from(v);
        }
        if let Some(v) = var("CHECKPOINT_DIR") {
            self.checkpoint_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
    }

    /// Validate settings, collecting every problem before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.llm_base_url.is_empty() {
            errors.push("llm_base_url cannot be empty".to_string());
        }
        if self.workspace.as_os_str().is_empty() {
            errors.push("workspace cannot be empty".to_string());
        }
        if self.output_directory.as_os_str().is_empty() {
            errors.push("output_directory cannot be empty".to_string());
        }

        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.log_level.to_uppercase().as_str()) {
            errors.push(format!(
                "log_level must be one of {valid_levels:?}, got '{}'",
                self.log_level
            ));
        }

        if self.llm_timeout_secs == 0 {
            errors.push("llm_timeout_secs must be positive".to_string());
        }
        if self.llm_retry_initial_delay_secs <= 0.0 {
            errors.push(format!(
                "llm_retry_initial_delay_secs must be positive, got {}",
                self.llm_retry_initial_delay_secs
            ));
        }
        if self.llm_retry_max_delay_secs <= self.llm_retry_initial_delay_secs {
            errors.push(format!(
                "llm_retry_max_delay_secs ({}) must be greater than llm_retry_initial_delay_secs ({})",
                self.llm_retry_max_delay_secs, self.llm_retry_initial_delay_secs
            ));
        }
        if self.llm_circuit_breaker_threshold == 0 {
            errors.push("llm_circuit_breaker_threshold must be positive".to_string());
        }
        if self.llm_circuit_breaker_timeout_secs <= 0.0 {
            errors.push("llm_circuit_breaker_timeout_secs must be positive".to_string());
        }
        if self.llm_circuit_breaker_half_open_successes == 0 {
            errors.push("llm_circuit_breaker_half_open_successes must be positive".to_string());
        }
        if self.max_concurrent_agents == 0 {
            errors.push("max_concurrent_agents must be positive".to_string());
        }

        if self.llm_max_retries > 10 {
            warn!(
                retries = self.llm_max_retries,
                "llm_max_retries is very high, consider reducing"
            );
        }
        if self.max_concurrent_agents > 20 {
            warn!(
                agents = self.max_concurrent_agents,
                "max_concurrent_agents is very high, this may cause resource issues"
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Builder for [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.llm_base_url = url.into();
        self
    }

    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.settings.llm_api_key = key.into();
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.settings.llm_model = model.into();
        self
    }

    pub fn llm_max_retries(mut self, retries: u32) -> Self {
        self.settings.llm_max_retries = retries;
        self
    }

    pub fn llm_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.settings.llm_circuit_breaker_threshold = threshold;
        self
    }

    pub fn llm_stream_responses(mut self, stream: bool) -> Self {
        self.settings.llm_stream_responses = stream;
        self
    }

    pub fn retry_delays(mut self, initial_secs: f64, max_secs: f64) -> Self {
        self.settings.llm_retry_initial_delay_secs = initial_secs;
        self.settings.llm_retry_max_delay_secs = max_secs;
        self
    }

    pub fn max_concurrent_agents(mut self, n: usize) -> Self {
        self.settings.max_concurrent_agents = n;
        self
    }

    pub fn workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.workspace = path.into();
        self
    }

    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.output_directory = path.into();
        self
    }

    pub fn checkpoint_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.checkpoint_dir = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Settings, ConfigError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
