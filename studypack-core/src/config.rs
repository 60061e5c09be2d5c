//! Configuration management for StudyPack.
//!
//! Configuration is loaded in order of precedence:
//! 1. Defaults
//! 2. Config file (~/.studypack/config.toml)
//! 3. Environment variables
//! 4. CLI flags (handled at CLI layer)
//!
//! Limits are read once at startup; nothing here is mutated while serving.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Generations allowed per actor per calendar day
pub const DAILY_LIMIT: u32 = 10;
/// Requests admitted per actor inside one rate window
pub const RATE_LIMIT_REQUESTS: u32 = 5;
/// Length of the sliding rate window in seconds
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Upper bound on the size of a single chunk, in characters
pub const MAX_CHUNK_CHARS: usize = 3000;
/// A newline closer than this to the chunk start is not used as a cut point
pub const MIN_BREAK_DISTANCE: usize = 500;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Gemini CLI configuration (the completion backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Path to the gemini binary (default: "gemini")
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Model used for every completion call
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout in seconds (0 = no timeout)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on tokens generated per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_binary() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Key callers by `x-user-id` / `x-forwarded-for`. Only enable behind a
    /// gateway that authenticates users and overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    11436
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy_headers: false,
        }
    }
}

/// Where quota and rate state lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStore {
    /// Process-local maps; a restart resets every quota
    #[default]
    Memory,
    /// SQLite database shared by every process pointing at it
    Sqlite,
}

impl std::fmt::Display for QuotaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaStore::Memory => write!(f, "memory"),
            QuotaStore::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Generations per actor per day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Requests per actor inside the rate window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Rate window length in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Backing store for quota state
    #[serde(default)]
    pub store: QuotaStore,

    /// Database path for the sqlite store (defaults to ~/.studypack/usage.db)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_daily_limit() -> u32 {
    DAILY_LIMIT
}

fn default_rate_limit() -> u32 {
    RATE_LIMIT_REQUESTS
}

fn default_rate_window_secs() -> u64 {
    RATE_LIMIT_WINDOW_SECS
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            store: QuotaStore::default(),
            db_path: None,
        }
    }
}

impl QuotaConfig {
    /// Resolve the database path for the sqlite store
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(Config::default_db_path)
    }
}

/// When a generation is charged against the daily quota
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumePolicy {
    /// Charge before any completion call; failed generations still count
    #[default]
    BeforeGeneration,
    /// Check remaining quota up front, charge only once every call succeeded
    AfterSuccess,
}

/// Study pack generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Minimum distance from the chunk start for a newline cut
    #[serde(default = "default_min_break_distance")]
    pub min_break_distance: usize,

    /// When quota is consumed
    #[serde(default)]
    pub consume: ConsumePolicy,
}

fn default_max_chunk_chars() -> usize {
    MAX_CHUNK_CHARS
}

fn default_min_break_distance() -> usize {
    MIN_BREAK_DISTANCE
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_break_distance: default_min_break_distance(),
            consume: ConsumePolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Returns the StudyPack configuration directory (~/.studypack)
    pub fn studypack_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".studypack"))
    }

    /// Returns the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::studypack_dir().map(|d| d.join("config.toml"))
    }

    /// Returns the default quota database path
    pub fn default_db_path() -> Option<PathBuf> {
        Self::studypack_dir().map(|d| d.join("usage.db"))
    }

    /// Load configuration from the default path with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("STUDYPACK_MODEL") {
            self.gemini.model = model;
        }

        if let Ok(binary) = std::env::var("STUDYPACK_GEMINI_BINARY") {
            self.gemini.binary = binary;
        }

        if let Ok(port) = std::env::var("STUDYPACK_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(host) = std::env::var("STUDYPACK_HOST") {
            self.server.host = host;
        }

        if let Ok(trust) = std::env::var("STUDYPACK_TRUST_PROXY_HEADERS") {
            if let Ok(trust) = trust.parse() {
                self.server.trust_proxy_headers = trust;
            }
        }

        if let Ok(level) = std::env::var("STUDYPACK_LOG_LEVEL") {
            self.logging.level = level;
        }

        // STUDYPACK_QUOTA_STORE selects memory or sqlite
        if let Ok(store) = std::env::var("STUDYPACK_QUOTA_STORE") {
            match store.to_lowercase().as_str() {
                "memory" => self.quota.store = QuotaStore::Memory,
                "sqlite" => self.quota.store = QuotaStore::Sqlite,
                _ => {}
            }
        }

        if let Ok(path) = std::env::var("STUDYPACK_DB_PATH") {
            self.quota.db_path = Some(PathBuf::from(path));
        }
    }

    /// Reject limits that would make every request fail or loop forever
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.max_chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if self.quota.rate_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "quota.rate_window_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(path) = Self::default_config_path() {
            self.save_to_file(&path)
        } else {
            Err(ConfigError::ValidationError(
                "Could not determine config path".to_string(),
            ))
        }
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the server URL
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// Ensure the StudyPack directory exists
    pub fn ensure_dirs() -> std::io::Result<()> {
        if let Some(dir) = Self::studypack_dir() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gemini.binary, "gemini");
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.server.trust_proxy_headers);
        assert_eq!(config.quota.daily_limit, 10);
        assert_eq!(config.quota.rate_limit, 5);
        assert_eq!(config.quota.rate_window_secs, 60);
        assert_eq!(config.quota.store, QuotaStore::Memory);
        assert_eq!(config.generation.max_chunk_chars, 3000);
        assert_eq!(config.generation.min_break_distance, 500);
        assert_eq!(config.generation.consume, ConsumePolicy::BeforeGeneration);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.generation.consume, parsed.generation.consume);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[quota]
store = "sqlite"

[generation]
consume = "after_success"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.quota.store, QuotaStore::Sqlite);
        assert_eq!(config.generation.consume, ConsumePolicy::AfterSuccess);
        // Defaults still applied
        assert_eq!(config.quota.daily_limit, DAILY_LIMIT);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.generation.max_chunk_chars = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
