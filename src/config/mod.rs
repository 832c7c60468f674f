use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Session configuration.
    pub session: SessionConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive.
    pub level: String,
    /// Log output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Conversation session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Title given to the root branch of a fresh tree.
    pub root_title: String,
    /// Number of characters in generated fork titles.
    pub fork_title_len: usize,
}

/// Longest generated fork title (a simple-format UUID has 32 hex chars).
pub const MAX_FORK_TITLE_LEN: usize = 32;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_title: "root".to_string(),
            fork_title_len: 6,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(LogFormat::Pretty),
        };

        let root_title = env::var("TREECHAT_ROOT_TITLE").unwrap_or_else(|_| "root".to_string());
        if root_title.trim().is_empty() {
            return Err(AppError::Config {
                message: "TREECHAT_ROOT_TITLE must not be empty".to_string(),
            });
        }

        let session = SessionConfig {
            root_title,
            fork_title_len: env::var("TREECHAT_FORK_TITLE_LEN")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(6)
                .clamp(1, MAX_FORK_TITLE_LEN),
        };

        Ok(Config { logging, session })
    }
}
