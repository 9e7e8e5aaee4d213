//! Store and retry configuration.
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables:
//! - `TASKBOARD_DB` - database file path
//! - `TASKBOARD_MAX_ATTEMPTS` - attempts per operation before giving up
//! - `TASKBOARD_RETRY_BACKOFF_MS` - base backoff between attempts
//! - `TASKBOARD_BUSY_TIMEOUT_MS` - how long SQLite waits on a locked database

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "taskboard";
const DB_FILE: &str = "taskboard.db";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoardConfig {
    /// Database file. `None` means the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Attempts per mutating operation when the store reports a conflict.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `retry_backoff_ms * n`.
    pub retry_backoff_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_attempts: 3,
            retry_backoff_ms: 25,
            busy_timeout_ms: 5000,
        }
    }
}

impl BoardConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("TASKBOARD_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(n) = var("TASKBOARD_MAX_ATTEMPTS").and_then(|s| s.parse().ok()) {
            self.max_attempts = n;
        }
        if let Some(ms) = var("TASKBOARD_RETRY_BACKOFF_MS").and_then(|s| s.parse().ok()) {
            self.retry_backoff_ms = ms;
        }
        if let Some(ms) = var("TASKBOARD_BUSY_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.busy_timeout_ms = ms;
        }
    }

    /// Resolved database path, falling back to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join(DB_FILE))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// Runtime form of the retry settings held by a `Database`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub busy_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        BoardConfig::default().retry_policy()
    }
}
