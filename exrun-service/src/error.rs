// Service Errors
// One error type shared by the template engine, pipeline runner, queue and dispatchers

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the service
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised while expanding, running or distributing configurations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Document text could not be parsed
    #[error("{file}:{line}:{column}: {message}")]
    ConfigParse {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Document parsed but has the wrong structure
    #[error("invalid configuration: {0}")]
    ConfigShape(String),

    #[error("link cycle detected: {}", chain.join(" -> "))]
    LinkCycle { chain: Vec<String> },

    #[error("link target '{path}' does not exist and no default was given")]
    LinkMissing { path: String },

    #[error("expression error: {0}")]
    Expression(String),

    /// A work-unit descriptor could not be turned into a unit
    #[error("failed to load unit '{identifier}': {reason}")]
    UnitLoad { identifier: String, reason: String },

    #[error("unit '{unit}' failed: {message}")]
    UnitRun { unit: String, message: String },

    #[error("worker {worker} failed: {message}")]
    RemoteExecution { worker: String, message: String },

    /// Connection-level queue failure, retried internally once
    #[error("queue connection lost: {0}")]
    QueueTransient(String),

    /// Any other queue storage failure
    #[error("queue storage error: {0}")]
    QueueStorage(String),

    #[error("command '{command}' exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    /// Every worker in a cluster pool has failed
    #[error("no workers left in pool, {pending} unit(s) could not be run")]
    PoolExhausted { pending: usize },

    #[error("file not found in search path: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn unit_run(unit: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::UnitRun {
            unit: unit.into(),
            message: message.into(),
        }
    }

    pub fn unit_load(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        ServiceError::UnitLoad {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Whether the queue retry policy applies to this error
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::QueueTransient(_))
    }

    /// Errors that abort the bootstrap of a single configuration before any unit runs
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ServiceError::ConfigParse { .. }
                | ServiceError::ConfigShape(_)
                | ServiceError::LinkCycle { .. }
                | ServiceError::LinkMissing { .. }
                | ServiceError::Expression(_)
                | ServiceError::UnitLoad { .. }
        )
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Tls(_) => ServiceError::QueueTransient(err.to_string()),
            other => ServiceError::QueueStorage(other.to_string()),
        }
    }
}
