//! Error types for VibeFlow

use thiserror::Error;

/// Errors that can occur while driving the flow pipeline
#[derive(Debug, Error)]
pub enum VibeflowError {
    #[error("Failed to parse host payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid host event: {0}")]
    InvalidEvent(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Key-value store error: {0}")]
    Store(String),

    #[error("Export failed: {0}")]
    Export(String),
}
