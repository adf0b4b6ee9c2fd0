//! Error types for the tour engine.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tour error: {0}")]
    Tour(#[from] TourError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Catalog lookup errors. The only errors the engine surfaces to callers.
#[derive(Debug, thiserror::Error)]
pub enum TourError {
    #[error("Tour {id} is not registered")]
    TourNotFound { id: String },

    #[error("Step {step} not found in tour {tour}")]
    StepNotFound { tour: String, step: String },

    #[error("Tour {id} has no steps")]
    EmptyTour { id: String },

    #[error("Unknown tour identifier: {0}")]
    UnknownTour(String),
}

/// Key/value storage errors. Absorbed by the persistence layer, never
/// returned from tour playback.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while evaluating a tour guard. A failing guard counts as
/// "do not start".
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Guard {name} failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors reported by a rendering adapter.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer failed: {0}")]
    Failed(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
