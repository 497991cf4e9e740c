//! Error types for daemon operations.

use thiserror::Error;

/// Errors that can occur while talking to or managing the Ollama daemon.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Daemon returned an error response.
    #[error("Ollama API error: {0}")]
    Api(String),

    /// Daemon is not running or not reachable.
    #[error("Ollama not running at {0}. Start it with: ollama serve")]
    ServerNotRunning(String),

    /// Daemon answered the liveness probe with a non-success status.
    #[error("Ollama at {url} answered with HTTP {status}")]
    Unhealthy { url: String, status: u16 },

    /// Daemon process could not be launched.
    #[error("Failed to start Ollama: {0}")]
    SpawnFailed(String),

    /// Generation was cancelled by the user.
    #[error("generation cancelled")]
    Cancelled,

    /// Request was rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Input problems caught before a request leaves the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("prompt is empty")]
    BlankPrompt,

    #[error("no model selected")]
    MissingModel,

    #[error("invalid value for {field}: '{value}' is not a valid {expected}")]
    InvalidParameter {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Reasons a prompt submission is turned away by the coordinator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("a generation is already running")]
    Busy,

    #[error("prompt is empty")]
    BlankPrompt,
}
