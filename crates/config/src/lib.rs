//! Configuration loading, validation, and management for Threadline.
//!
//! Loads configuration from `~/.threadline/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup; a config that fails validation never reaches a turn.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use threadline_core::MemoryMode;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional cap on reply length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System prompt placed at the head of every model call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// History trimming
    #[serde(default)]
    pub history: HistoryConfig,

    /// Session storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Tool gating and tool endpoints
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_system_prompt() -> String {
    "You are a helpful and concise assistant.".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .field("history", &self.history)
            .field("store", &self.store)
            .field("tools", &self.tools)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Token budget for system prompt plus retained history
    #[serde(default = "default_history_max_tokens")]
    pub max_tokens: usize,
}

fn default_history_max_tokens() -> usize {
    1200
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_history_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file backing `persistent` sessions
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Mode used when a request does not name one
    #[serde(default = "default_mode")]
    pub default_mode: MemoryMode,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from(".data/memory.sqlite")
}
fn default_mode() -> MemoryMode {
    MemoryMode::Persistent
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            default_mode: default_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Prefixes that invite tool use for a message (case-insensitive)
    #[serde(default = "default_trigger_prefixes")]
    pub trigger_prefixes: Vec<String>,

    /// Timeout for each tool HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,

    #[serde(default = "default_geocoding_base_url")]
    pub geocoding_base_url: String,

    #[serde(default = "default_wiki_base_url")]
    pub wiki_base_url: String,
}

fn default_trigger_prefixes() -> Vec<String> {
    vec!["/weather".into(), "/wiki".into(), "/upper".into()]
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_weather_base_url() -> String {
    "https://api.open-meteo.com".into()
}
fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com".into()
}
fn default_wiki_base_url() -> String {
    "https://en.wikipedia.org".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            trigger_prefixes: default_trigger_prefixes(),
            http_timeout_secs: default_http_timeout_secs(),
            weather_base_url: default_weather_base_url(),
            geocoding_base_url: default_geocoding_base_url(),
            wiki_base_url: default_wiki_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.threadline/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and re-validate.
    ///
    /// Environment variables:
    /// - `THREADLINE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `OPENAI_MODEL`, `OPENAI_BASE_URL`
    /// - `SQLITE_PATH`, `SYSTEM_PROMPT`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process env in production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("THREADLINE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(path) = lookup("SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(path);
        }
        if let Some(prompt) = lookup("SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".threadline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.history.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_tokens must be > 0".into(),
            ));
        }

        if self.tools.trigger_prefixes.is_empty() {
            return Err(ConfigError::ValidationError(
                "tools.trigger_prefixes must name at least one prefix".into(),
            ));
        }

        if self.tools.trigger_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "tools.trigger_prefixes must not contain empty prefixes".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            system_prompt: default_system_prompt(),
            history: HistoryConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
