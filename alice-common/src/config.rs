//! Configuration management for the Alice skill service.
//!
//! The service reads a single configuration file at `~/.alice-skill/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (ALICE_* prefix, plus `OPENAI_*` for the backend)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ALICE_BIND_ADDRESS` → network.bind
//! - `ALICE_PORT` → network.port
//! - `ALICE_ANSWER_TIMEOUT_MS` → dialog.answer_timeout_ms
//! - `ALICE_SESSION_TTL_SECS` → sessions.ttl_secs
//! - `ALICE_ORACLE_MODEL` → oracle.model
//! - `ALICE_LOG_LEVEL` → observability.log_level
//! - `OPENAI_API_KEY` → oracle.api_key
//! - `OPENAI_BASE_URL` → oracle.endpoint

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".alice-skill"),
        |dirs| dirs.home_dir().join(".alice-skill"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Listener configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Turn protocol timing and phrases
    #[serde(default)]
    pub dialog: DialogConfig,

    /// Session store bounds
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Language-model backend
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("ALICE_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Ok(port) = std::env::var("ALICE_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }
        if let Ok(ms) = std::env::var("ALICE_ANSWER_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.dialog.answer_timeout_ms = ms;
            }
        }
        if let Ok(ttl) = std::env::var("ALICE_SESSION_TTL_SECS") {
            if let Ok(ttl) = ttl.parse() {
                self.sessions.ttl_secs = ttl;
            }
        }
        if let Ok(model) = std::env::var("ALICE_ORACLE_MODEL") {
            self.oracle.model = model;
        }
        if let Ok(level) = std::env::var("ALICE_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.oracle.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.oracle.endpoint = url;
        }
    }

    /// Socket address string the HTTP listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

// ============================================================================
// Network
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. The voice platform calls in from outside, so the
    /// default listens on all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for in-flight HTTP requests on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    10
}

// ============================================================================
// Dialog
// ============================================================================

/// Turn protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// How long a turn waits for a freshly started backend call.
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_ms: u64,

    /// Hard response deadline imposed by the voice platform.
    #[serde(default = "default_platform_deadline")]
    pub platform_deadline_ms: u64,

    /// Leading wake phrase removed from utterances (matched case-insensitively)
    #[serde(default = "default_wake_word")]
    pub wake_word: String,

    /// Reply for an empty utterance
    #[serde(default = "default_prompt_text")]
    pub prompt_text: String,

    /// Spoken hint when a new question outlives the turn
    #[serde(default = "default_thinking_text")]
    pub thinking_text: String,

    /// Spoken hint when a poll finds the answer still running
    #[serde(default = "default_not_ready_text")]
    pub not_ready_text: String,

    /// Prefix of the answer text delivered when the backend fails
    #[serde(default = "default_failure_prefix")]
    pub failure_prefix: String,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            answer_timeout_ms: default_answer_timeout(),
            platform_deadline_ms: default_platform_deadline(),
            wake_word: default_wake_word(),
            prompt_text: default_prompt_text(),
            thinking_text: default_thinking_text(),
            not_ready_text: default_not_ready_text(),
            failure_prefix: default_failure_prefix(),
        }
    }
}

impl DialogConfig {
    /// Per-turn wait bound.
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    /// Platform response deadline.
    pub fn platform_deadline(&self) -> Duration {
        Duration::from_millis(self.platform_deadline_ms)
    }
}

fn default_answer_timeout() -> u64 {
    5_000
}

fn default_platform_deadline() -> u64 {
    7_000
}

fn default_wake_word() -> String {
    "алиса".into()
}

fn default_prompt_text() -> String {
    "Я умный чат-бот. Спроси что-нибудь".into()
}

fn default_thinking_text() -> String {
    "Думаю над ответом, спросите чуть позже".into()
}

fn default_not_ready_text() -> String {
    "Ответ пока не готов, спросите позже".into()
}

fn default_failure_prefix() -> String {
    "Не удалось получить ответ".into()
}

// ============================================================================
// Sessions
// ============================================================================

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle time after which a session is dropped
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of tracked sessions
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Interval of the background expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl SessionsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_session_ttl() -> u64 {
    30 * 60
}

fn default_max_entries() -> usize {
    10_000
}

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// Oracle
// ============================================================================

/// Language-model backend configuration (OpenAI Responses API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// API base URL
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,

    /// Model identifier
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// API key (usually supplied through `OPENAI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Timeout of a single backend call, in seconds
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    /// Ask the backend to keep responses so they can be continued
    #[serde(default = "default_true")]
    pub store: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
            api_key: None,
            timeout_secs: default_oracle_timeout(),
            store: true,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_oracle_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

fn default_oracle_model() -> String {
    "gpt-5-nano".into()
}

fn default_oracle_timeout() -> u64 {
    5
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}
