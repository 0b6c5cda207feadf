//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/callscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/callscope/` (~/.config/callscope/)
//! - Data: `$XDG_DATA_HOME/callscope/` (~/.local/share/callscope/)
//! - State/Logs: `$XDG_STATE_HOME/callscope/` (~/.local/state/callscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable holding the credential encryption secret.
pub const ENCRYPTION_KEY_ENV: &str = "CALLSCOPE_ENCRYPTION_KEY";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Telephony provider API configuration
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Transcription engine configuration (optional)
    #[serde(default)]
    pub transcription: Option<TranscriptionConfig>,

    /// LLM configuration for call analysis (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Discovery pipeline configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Compliance sync configuration
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telephony provider API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    /// Base URL override; per-agency credentials may carry their own.
    pub base_url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_telephony_timeout")]
    pub timeout_secs: u64,

    /// Fixed delay between successive page/chunk requests (rate limiting)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Max retry attempts for transient page failures
    #[serde(default = "default_telephony_max_retries")]
    pub max_retries: usize,

    /// Minimum call duration accepted by fetchers, in seconds
    #[serde(default = "default_min_duration_sec")]
    pub min_duration_sec: i64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_telephony_timeout(),
            page_delay_ms: default_page_delay_ms(),
            max_retries: default_telephony_max_retries(),
            min_duration_sec: default_min_duration_sec(),
        }
    }
}

fn default_telephony_timeout() -> u64 {
    30
}

fn default_page_delay_ms() -> u64 {
    150
}

fn default_telephony_max_retries() -> usize {
    3
}

fn default_min_duration_sec() -> i64 {
    10
}

/// Transcription engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    /// Engine endpoint URL
    pub endpoint: String,

    /// API key (can also use env var)
    pub api_key: Option<String>,

    /// Overall per-call transcription timeout in seconds
    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
}

fn default_transcription_timeout() -> u64 {
    45
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Hard timeout for one analysis call in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    25
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Discovery pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Target call count for one discovery run
    #[serde(default = "default_call_count")]
    pub call_count: usize,

    /// Concurrent transcriptions per batch
    #[serde(default = "default_transcribe_batch")]
    pub transcribe_batch_size: usize,

    /// Concurrent analyses per batch
    #[serde(default = "default_analyze_batch")]
    pub analyze_batch_size: usize,

    /// Delay between batches in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Minimum successfully transcribed calls before the run is viable
    #[serde(default = "default_min_transcribed")]
    pub min_transcribed: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            call_count: default_call_count(),
            transcribe_batch_size: default_transcribe_batch(),
            analyze_batch_size: default_analyze_batch(),
            batch_delay_ms: default_batch_delay_ms(),
            min_transcribed: default_min_transcribed(),
        }
    }
}

fn default_call_count() -> usize {
    2500
}

fn default_transcribe_batch() -> usize {
    20
}

fn default_analyze_batch() -> usize {
    50
}

fn default_batch_delay_ms() -> u64 {
    250
}

fn default_min_transcribed() -> usize {
    100
}

/// Compliance sync configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ComplianceConfig {
    /// Trailing window for the sales sweep, in days
    #[serde(default = "default_compliance_window")]
    pub window_days: i64,

    /// Page size for the single-sweep fetch
    #[serde(default = "default_compliance_page_size")]
    pub page_size: usize,

    /// Hard safety cap on pages per sweep
    #[serde(default = "default_compliance_max_pages")]
    pub max_pages: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            window_days: default_compliance_window(),
            page_size: default_compliance_page_size(),
            max_pages: default_compliance_max_pages(),
        }
    }
}

fn default_compliance_window() -> i64 {
    90
}

fn default_compliance_page_size() -> usize {
    10_000
}

fn default_compliance_max_pages() -> usize {
    20
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/callscope/config.toml` (~/.config/callscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("callscope").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("callscope")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("callscope")
    }

    /// Returns the database file path
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("callscope.log")
    }

    /// Returns the credential encryption secret from the environment, if set.
    pub fn encryption_secret() -> Option<String> {
        std::env::var(ENCRYPTION_KEY_ENV).ok()
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path
    /// behavior before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
