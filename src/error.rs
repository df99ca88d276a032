// src/error.rs
use thiserror::Error;

/// Result type used throughout the backend
pub type Result<T> = std::result::Result<T, BackendError>;

/// Custom Error type for the kafka backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("URL error: {0}")]
    Url(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
