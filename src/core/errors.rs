// Custom error types for the OCR task service
//
// Using thiserror for ergonomic error definitions with:
// - Type-safe error matching at each isolation boundary
// - Automatic Display/Error trait implementations
// - Source error chaining

use thiserror::Error;

use crate::core::types::TaskStatus;

/// Recognition backend errors (construction and invocation)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} did not finish within {limit:?}")]
    Timeout {
        command: String,
        limit: std::time::Duration,
    },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("image encoding failed: {0}")]
    Encoding(#[from] image::ImageError),

    #[error("invalid backend output: {0}")]
    InvalidOutput(String),

    #[error("backend panicked: {0}")]
    Panicked(String),
}

/// Image normalization errors
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

/// Task store and export precondition errors
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task not completed (status: {status})")]
    NotCompleted { status: TaskStatus },

    #[error("No results available")]
    NoResults,

    #[error("Server busy: {active} active tasks (limit {limit}), retry later")]
    ServerBusy { active: usize, limit: usize },
}

/// Submission validation errors, raised before any background state exists
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("No valid image files found")]
    NoValidFiles,

    #[error("Unknown mode '{0}' (expected 'normal' or 'high_accuracy')")]
    InvalidMode(String),

    #[error("Invalid language code '{0}' (expected a 2-letter code)")]
    InvalidLanguage(String),

    #[error("Too many languages: {count} (maximum {max})")]
    TooManyLanguages { count: usize, max: usize },

    #[error("File too large. Maximum size is {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

/// Whole-task failures outside the per-file isolation boundary
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Task record disappeared: {0}")]
    TaskVanished(String),

    #[error("Background worker failed: {0}")]
    WorkerFailed(String),

    #[error("Task store error: {0}")]
    Store(#[from] TaskError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid engine config: {0}")]
    InvalidEngineConfig(String),

    #[error("Invalid task config: {0}")]
    InvalidTaskConfig(String),

    #[error("Minimum confidence must be in [0.0, 1.0], got {0}")]
    InvalidConfidence(f32),

    #[error("Environment variable {key} has an invalid value '{value}'")]
    EnvVarError { key: String, value: String },
}

// Convenience type aliases for Results
pub type EngineResult<T> = Result<T, EngineError>;
pub type TaskResult<T> = Result<T, TaskError>;
