//! Configuration for the focus session core.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FOCUS_STATE_DIR` | No | `<data dir>/focus` | Directory holding the session snapshot |
//! | `FOCUS_TICK_INTERVAL_MS` | No | 250 | Tick engine period in milliseconds |
//! | `FOCUS_BREAK_MINUTES` | No | 5 | Break length started after a focus session |
//! | `FOCUS_CHANNEL_CAPACITY` | No | 256 | Capacity of engine and tab channels |
//! | `FOCUS_TASK_COLLECTION` | No | `tasks` | Task store collection holding session items |
//!
//! # Example
//!
//! ```no_run
//! use focus_core::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Snapshot: {}", config.snapshot_path().display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::types::MAX_DURATION_MINUTES;

/// Default tick engine period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 250;

/// Default break length in minutes.
pub const DEFAULT_BREAK_MINUTES: u64 = 5;

/// Default capacity for the engine and broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default collection name for task items.
pub const DEFAULT_TASK_COLLECTION: &str = "tasks";

/// File name of the persisted snapshot inside the state directory.
pub const SNAPSHOT_FILE_NAME: &str = "active-session.json";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine a data directory for the default state path.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the focus session core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that holds the persisted snapshot.
    pub state_dir: PathBuf,

    /// Period of the shared tick interval.
    pub tick_interval: Duration,

    /// Break length in minutes used by finish-and-break.
    pub break_minutes: u64,

    /// Capacity of the engine command/event channels and the tab bus.
    pub channel_capacity: usize,

    /// Collection name passed to the task store when editing items.
    pub task_collection: String,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a numeric variable is set but is not a positive integer
    /// - `FOCUS_BREAK_MINUTES` exceeds [`MAX_DURATION_MINUTES`]
    /// - `FOCUS_STATE_DIR` is unset and no data directory can be determined
    pub fn from_env() -> Result<Self, ConfigError> {
        let state_dir = match env::var("FOCUS_STATE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => ProjectDirs::from("", "", "focus")
                .ok_or(ConfigError::NoHomeDirectory)?
                .data_dir()
                .to_path_buf(),
        };

        let tick_interval_ms = parse_positive("FOCUS_TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS)?;
        let break_minutes = parse_positive("FOCUS_BREAK_MINUTES", DEFAULT_BREAK_MINUTES)?;
        if break_minutes > MAX_DURATION_MINUTES {
            return Err(ConfigError::InvalidValue {
                key: "FOCUS_BREAK_MINUTES".to_string(),
                message: format!("must be at most {MAX_DURATION_MINUTES}"),
            });
        }
        let channel_capacity =
            parse_positive("FOCUS_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY as u64)?;
        let channel_capacity =
            usize::try_from(channel_capacity).map_err(|_| ConfigError::InvalidValue {
                key: "FOCUS_CHANNEL_CAPACITY".to_string(),
                message: "value is too large".to_string(),
            })?;

        let task_collection = env::var("FOCUS_TASK_COLLECTION")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_COLLECTION.to_string());

        Ok(Self {
            state_dir,
            tick_interval: Duration::from_millis(tick_interval_ms),
            break_minutes,
            channel_capacity,
            task_collection,
        })
    }

    /// Returns a configuration rooted at `state_dir` with every other value
    /// at its default.
    #[must_use]
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            break_minutes: DEFAULT_BREAK_MINUTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            task_collection: DEFAULT_TASK_COLLECTION.to_string(),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_FILE_NAME)
    }
}

fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}
