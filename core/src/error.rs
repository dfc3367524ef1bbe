//! Error types for the focus session core.
//!
//! Each component defines its own error enum next to the code that raises it;
//! [`FocusError`] aggregates them for callers that drive the whole core.
//! Most recoverable conditions (corrupt snapshots, locked audio, missing
//! notification support) never surface as errors at all: they are logged and
//! degraded gracefully by the component that hits them.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::{AudioError, NotifyError};
use crate::engine::EngineError;
use crate::persistence::StorageError;
use crate::tasks::TaskStoreError;

/// Errors that can occur while driving a focus session.
///
/// # Examples
///
/// ```ignore
/// use focus_core::error::FocusError;
///
/// fn load() -> Result<(), FocusError> {
///     let config = focus_core::Config::from_env()?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum FocusError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Tick engine is no longer reachable.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Audio output error.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// Notification backend error.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Task store error.
    #[error("task store error: {0}")]
    TaskStore(#[from] TaskStoreError),
}

/// A specialized `Result` type for focus core operations.
pub type Result<T> = std::result::Result<T, FocusError>;
