//! Error types for the bridge engine.

use thiserror::Error;

use crate::dispatch::transport::TransportError;

/// Bridge error type
///
/// Admission and dispatch failures are returned to callers. Correlation
/// failures (`CorrelationMiss`) are only ever logged by the event intake path.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Dispatch failed for task {task_id}: {reason}")]
    DispatchFailed { task_id: String, reason: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Too many tasks on worker {worker_id}: {live} live, ceiling {ceiling}")]
    TooManyTasks {
        worker_id: String,
        live: usize,
        ceiling: usize,
    },

    #[error("No live task matched {key}")]
    CorrelationMiss { key: String },

    #[error("Timed out waiting for task {task_id} after {waited_secs}s")]
    Timeout { task_id: String, waited_secs: u64 },

    #[error("Worker not found: {worker_id}")]
    WorkerNotFound { worker_id: String },

    #[error("Task {task_id} is in state {state}: {reason}")]
    InvalidTaskState {
        task_id: String,
        state: String,
        reason: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Result channel closed for task {task_id}")]
    ChannelClosed { task_id: String },
}

impl BridgeError {
    pub fn dispatch_failed(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DispatchFailed {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    /// Whether the caller should back off and resubmit later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManyTasks { .. })
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(error: config::ConfigError) -> Self {
        BridgeError::Configuration(error.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        BridgeError::InvalidParameter(format!("JSON serialization error: {error}"))
    }
}

/// Result type alias for BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
