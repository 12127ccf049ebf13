//! Configuration management for envelope
//!
//! Per-backend defaults, file loading and environment overrides. The core
//! never reads the environment on its own; only this layer does.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cli_executor::{ClaudeCodeOptions, CodexOptions};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Claude Code backend options
    pub claude_code: ClaudeCodeOptions,
    /// Codex backend options
    pub codex: CodexOptions,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl EnvelopeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Override loaded values with `ENVELOPE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = env::var("ENVELOPE_CLAUDE_PATH") {
            self.claude_code.claude_path = Some(non_empty("ENVELOPE_CLAUDE_PATH", path)?);
        }

        if let Ok(path) = env::var("ENVELOPE_CODEX_PATH") {
            self.codex.codex_path = Some(non_empty("ENVELOPE_CODEX_PATH", path)?);
        }

        if let Ok(level) = env::var("ENVELOPE_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", VALID_LEVELS.join(", ")),
            });
        }

        let claude = &self.claude_code;
        check_path("claude_code.claude_path", claude.claude_path.as_deref())?;
        check_timeout("claude_code.timeout", claude.timeout)?;
        if let Some(budget) = claude.max_budget_usd {
            if !budget.is_finite() || budget < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "claude_code.max_budget_usd".to_string(),
                    reason: "Budget must be a non-negative number".to_string(),
                });
            }
        }

        check_path("codex.codex_path", self.codex.codex_path.as_deref())?;
        check_timeout("codex.timeout", self.codex.timeout)?;

        Ok(())
    }
}

fn non_empty(key: &str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "Value cannot be empty".to_string(),
        });
    }
    Ok(value)
}

fn check_path(key: &str, path: Option<&str>) -> Result<(), ConfigError> {
    match path {
        Some(p) if p.trim().is_empty() => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "Executable path cannot be empty".to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_timeout(key: &str, timeout: Option<Duration>) -> Result<(), ConfigError> {
    match timeout {
        Some(t) if t.is_zero() => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "Timeout must be > 0".to_string(),
        }),
        _ => Ok(()),
    }
}
