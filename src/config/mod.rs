//! Configuration management for the enrollment orchestrator
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.
//!
//! ```toml
//! [orchestrator]
//! interval_ms = 60000
//! event_buffer = 100
//! autostart = true
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::scheduler::OrchestratorConfig;

/// Log formats understood by the binary
pub const LOG_FORMATS: &[&str] = &["text", "json"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan loop configuration
    pub orchestrator: OrchestratorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source shaped like the environment.
    ///
    /// Absent or unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let interval_ms = lookup("ENROLL_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.orchestrator.interval_ms);

        let event_buffer = lookup("ENROLL_EVENT_BUFFER")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.orchestrator.event_buffer);

        let autostart = lookup("ENROLL_AUTOSTART")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.orchestrator.autostart);

        let level = lookup("ENROLL_LOG_LEVEL").unwrap_or(defaults.logging.level);
        let format = lookup("ENROLL_LOG_FORMAT").unwrap_or(defaults.logging.format);

        Self {
            orchestrator: OrchestratorConfig {
                interval_ms,
                event_buffer,
                autostart,
            },
            logging: LoggingConfig { level, format },
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.orchestrator
            .validate()
            .context("Invalid orchestrator configuration")?;

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "log format must be one of {:?}, got '{}'",
                LOG_FORMATS,
                self.logging.format
            );
        }

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("log level must not be empty");
        }

        Ok(())
    }

    /// Get scan interval as Duration
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        self.orchestrator.interval()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
