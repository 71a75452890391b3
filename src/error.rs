//! Error types for the Rune watchdog

use thiserror::Error;

/// Result type for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Watchdog error types
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine not found: {0}")]
    EngineNotFound(String),

    #[error("No healthy engine available")]
    NoHealthyEngine,

    #[error("Container error: {0}")]
    Container(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
