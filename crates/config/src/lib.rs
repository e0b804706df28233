//! Configuration loading and validation for aiservices.
//!
//! Configuration is read from `~/.aiservices/config.toml` (or an explicit
//! path), falls back to defaults when the file is absent, and can be
//! overridden from the environment.

use aiservices_core::memory::RetentionPolicy;
use aiservices_core::message::DEFAULT_CONVERSATION_ID;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `default_conversation_id`.
pub const ENV_DEFAULT_CONVERSATION: &str = "AISERVICES_DEFAULT_CONVERSATION";

/// Environment variable overriding `max_sequential_tool_executions`.
pub const ENV_MAX_TOOL_EXECUTIONS: &str = "AISERVICES_MAX_TOOL_EXECUTIONS";

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Conversation identity used when a call supplies none
    #[serde(default = "default_conversation_id")]
    pub default_conversation_id: String,

    /// Maximum model calls in one tool loop
    #[serde(default = "default_max_sequential_tool_executions")]
    pub max_sequential_tool_executions: usize,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

fn default_conversation_id() -> String {
    DEFAULT_CONVERSATION_ID.into()
}
fn default_max_sequential_tool_executions() -> usize {
    100
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether invocations read and append conversation history
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Message window per conversation; absent keeps everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: None,
        }
    }
}

impl MemoryConfig {
    pub fn retention(&self) -> RetentionPolicy {
        match self.max_messages {
            Some(max_messages) => RetentionPolicy::MessageWindow { max_messages },
            None => RetentionPolicy::Unbounded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Buffered events between the stream task and its consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    128
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer of the event bus
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

fn default_events_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the default path (~/.aiservices/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(id) = lookup(ENV_DEFAULT_CONVERSATION) {
            self.default_conversation_id = id;
        }

        if let Some(raw) = lookup(ENV_MAX_TOOL_EXECUTIONS) {
            self.max_sequential_tool_executions = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{ENV_MAX_TOOL_EXECUTIONS} must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".aiservices")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_conversation_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_conversation_id must not be empty".into(),
            ));
        }

        if self.max_sequential_tool_executions == 0 {
            return Err(ConfigError::ValidationError(
                "max_sequential_tool_executions must be > 0".into(),
            ));
        }

        if self.memory.max_messages == Some(0) {
            return Err(ConfigError::ValidationError("memory.max_messages must be > 0".into()));
        }

        if self.streaming.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.channel_capacity must be > 0".into(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(ConfigError::ValidationError("events.capacity must be > 0".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_conversation_id: default_conversation_id(),
            max_sequential_tool_executions: default_max_sequential_tool_executions(),
            memory: MemoryConfig::default(),
            streaming: StreamingConfig::default(),
            events: EventsConfig::default(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = ServiceConfig::default();
        assert_eq!(config.default_conversation_id, "default");
        assert_eq!(config.max_sequential_tool_executions, 100);
        assert!(config.memory.enabled);
        assert_eq!(config.memory.retention(), RetentionPolicy::Unbounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = ServiceConfig {
            memory: MemoryConfig {
                enabled: false,
                max_messages: Some(20),
            },
            ..ServiceConfig::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ServiceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = ServiceConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_sequential_tool_executions = 5\n[memory]\nmax_messages = 10").unwrap();

        let config = ServiceConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_sequential_tool_executions, 5);
        assert_eq!(config.memory.retention(), RetentionPolicy::MessageWindow { max_messages: 10 });
        assert!(config.memory.enabled);
        assert_eq!(config.streaming.channel_capacity, 128);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_sequential_tool_executions = \"many\"").unwrap();

        let err = ServiceConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_ceiling_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_sequential_tool_executions = 0").unwrap();

        let err = ServiceConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_window_rejected() {
        let config = ServiceConfig {
            memory: MemoryConfig {
                enabled: true,
                max_messages: Some(0),
            },
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DEFAULT_CONVERSATION, "shared"),
            (ENV_MAX_TOOL_EXECUTIONS, "7"),
        ]);
        let mut config = ServiceConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_conversation_id, "shared");
        assert_eq!(config.max_sequential_tool_executions, 7);
    }

    #[test]
    fn bad_env_ceiling_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_MAX_TOOL_EXECUTIONS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_TOOL_EXECUTIONS));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = ServiceConfig::default_toml();
        assert!(toml_str.contains("max_sequential_tool_executions = 100"));
        assert!(toml_str.contains("[memory]"));
    }
}
