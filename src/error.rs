//! Error types for the yoda-vui runtime.

use crate::dispatcher::DispatchError;
use crate::lifetime::LifetimeError;
use crate::scheduler::AppError;

/// Top-level error type for the app orchestration runtime.
#[derive(Debug, thiserror::Error)]
pub enum VuiError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// App manifest could not be read or is invalid.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// JSON encode/decode error on the host line protocol.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Process supervision error.
    #[error(transparent)]
    App(#[from] AppError),

    /// Foreground stack error.
    #[error(transparent)]
    Lifetime(#[from] LifetimeError),

    /// Inbound event dispatch error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VuiError>;
